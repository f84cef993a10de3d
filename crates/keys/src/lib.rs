//! # schleier-keys
//!
//! Schluessel-Verzeichnis fuer Schleier.
//!
//! ## Module
//! - `directory` - Sitzung -> Schluessel-Epoch (create-or-get, Rotation, Eviction)
//! - `material` - 256-Bit-Schluesselmaterial (wird beim Drop genullt)
//! - `error` - Fehlertypen

pub mod directory;
pub mod error;
pub mod material;

// Bequeme Re-Exports
pub use directory::{KeyDirectory, KeyDirectoryConfig, SchluesselStand, SitzungsInfo};
pub use error::{SchluesselError, SchluesselResult};
pub use material::{SchluesselMaterial, SCHLUESSEL_LAENGE};
