pub mod bridge;
pub mod graph;
pub mod model;
pub mod names;
pub mod remote;
pub mod settings;
#[cfg(test)]
pub(crate) mod test_support;
