pub mod cleanup;
pub mod installed;
pub mod parser;
pub mod process;
pub mod residuals;
pub mod uninstall;
pub mod update;
pub mod updates;
pub mod winget;
