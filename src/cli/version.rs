//! Version command handler

use crate::camel::CamelCatalog;

/// Display version information
pub fn display_version() {
    println!("camelk-traits {}", env!("CARGO_PKG_VERSION"));
    println!("  {}", env!("CARGO_PKG_DESCRIPTION"));
    println!("  License: {}", env!("CARGO_PKG_LICENSE"));
    if let Ok(catalog) = CamelCatalog::embedded() {
        println!("  Embedded Camel K runtime: {}", catalog.runtime.version);
    }
}
