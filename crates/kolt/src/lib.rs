pub mod bench;
pub mod clock;
pub mod interpreter;
pub mod optimizer;
pub mod parser;
pub mod report;
