mod report;

pub use report::PoolReporter;
