//! Source instrumentation: AST-to-source transformer and the
//! instrumented-to-original sourcemap.

pub mod emit;
pub mod sourcemap;
pub mod transformer;

pub use sourcemap::SourceMap;
pub use transformer::{instrument, is_instrumented, Instrumented, SENTINEL};
