//! Workflow tests: commands chained the way a user would run them
