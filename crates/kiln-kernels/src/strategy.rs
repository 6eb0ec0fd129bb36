//! Implementation strategy selection.

use std::fmt;
use std::str::FromStr;

use crate::error::KernelError;

/// Which implementation of a kernel to run.
///
/// `Scalar` is the straightforward element-at-a-time loop. `Vectorized`
/// processes [`LANES`](crate::LANES)-wide chunks (AVX2 on x86_64 when the CPU
/// has it, lane-chunked portable code elsewhere) with a scalar tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    Scalar,
    #[default]
    Vectorized,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Scalar, Strategy::Vectorized];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Scalar => "scalar",
            Strategy::Vectorized => "vectorized",
        }
    }

    /// Code used across the C ABI.
    pub fn code(self) -> u32 {
        match self {
            Strategy::Scalar => 0,
            Strategy::Vectorized => 1,
        }
    }

    /// Decode a C ABI strategy code. Unknown codes select `Vectorized`.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Strategy::Scalar,
            _ => Strategy::Vectorized,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" | "naive" => Ok(Strategy::Scalar),
            "vectorized" | "simd" => Ok(Strategy::Vectorized),
            other => Err(KernelError::UnknownStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("scalar".parse::<Strategy>().unwrap(), Strategy::Scalar);
        assert_eq!(" Vectorized ".parse::<Strategy>().unwrap(), Strategy::Vectorized);
        assert_eq!("simd".parse::<Strategy>().unwrap(), Strategy::Vectorized);
        assert!(matches!(
            "avx9000".parse::<Strategy>(),
            Err(KernelError::UnknownStrategy(s)) if s == "avx9000"
        ));
    }

    #[test]
    fn test_codes() {
        for s in Strategy::ALL {
            assert_eq!(Strategy::from_code(s.code()), s);
        }
        assert_eq!(Strategy::from_code(42), Strategy::Vectorized);
        assert_eq!(Strategy::default(), Strategy::Vectorized);
        assert_eq!(Strategy::Scalar.to_string(), "scalar");
    }
}
