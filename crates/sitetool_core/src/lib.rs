pub mod attrs;
pub mod cluster;
pub mod config;
pub mod extract;
pub mod filesystem;
pub mod includes;
pub mod normalize;
pub mod prettify;
pub mod queries;
pub mod refactor;
pub mod rename;
pub mod rewrite;
pub mod runtime;
pub mod similarity;
