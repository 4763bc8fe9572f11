pub mod hints;
pub mod money;
pub mod prompt;
pub mod toast;
