pub mod cache;
pub mod effect_parser;
pub mod generation;
pub mod llm_client;
pub mod mutator;
pub mod prompt_builder;
pub mod summary;
pub mod tree_engine;

#[cfg(test)]
pub mod mock;
