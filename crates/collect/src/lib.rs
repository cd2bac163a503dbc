pub mod builtin;
pub mod manager;
pub mod rule;

pub use builtin::builtin_collectors;
pub use manager::{RuleManager, SyncReport};
pub use rule::{CollectRule, RuleContext, RuleView};
