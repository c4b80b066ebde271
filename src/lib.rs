pub mod cli;
pub mod core;
pub mod tui;

#[cfg(test)]
mod test_fixtures;
