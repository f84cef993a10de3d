//! Schluesselmaterial
//!
//! 256 Bit aus einer kryptografisch sicheren Zufallsquelle. Das Material
//! wird nie abgeleitet, nie geloggt und beim Drop mit Nullen ueberschrieben.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{SchluesselError, SchluesselResult};

/// Laenge eines Sitzungsschluessels in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(PartialEq, Eq)]
pub struct SchluesselMaterial([u8; SCHLUESSEL_LAENGE]);

impl SchluesselMaterial {
    /// Erzeugt neues Material aus der uebergebenen Zufallsquelle
    pub fn erzeugen(zufall: &SystemRandom) -> SchluesselResult<Self> {
        let mut bytes = [0u8; SCHLUESSEL_LAENGE];
        zufall
            .fill(&mut bytes)
            .map_err(|_| SchluesselError::Zufallsquelle)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.0
    }

    /// Base64-Darstellung fuer die HTTP-Auslieferung
    pub fn als_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl Drop for SchluesselMaterial {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SchluesselMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SchluesselMaterial([REDACTED] {} bytes)", SCHLUESSEL_LAENGE)
    }
}
