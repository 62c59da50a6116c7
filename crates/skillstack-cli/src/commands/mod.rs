pub mod add_rule;
pub mod init;
pub mod list_rules;
pub mod run;
pub mod validate;
