pub mod cancel;
pub mod cli;
pub mod error;
pub mod logging;
pub mod network;
pub mod output;
pub mod prompt;
pub mod scanner;
pub mod session;
pub mod validation;
