use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four Modbus register spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    Holding,
    Input,
    Coil,
    Discrete,
}

impl RegisterType {
    /// Whether this register space is bit-addressed (coil/discrete) rather
    /// than word-addressed (holding/input).
    pub fn is_bit_space(self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Discrete)
    }

    /// Whether writes are permitted for this register space.
    pub fn is_writable(self) -> bool {
        matches!(self, RegisterType::Holding | RegisterType::Coil)
    }

    /// Modbus limits: 1-125 for 16-bit registers, 1-2000 for bits.
    pub fn max_count(self) -> u16 {
        if self.is_bit_space() {
            2000
        } else {
            125
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegisterType::Holding => "holding",
            RegisterType::Input => "input",
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
        };
        f.write_str(s)
    }
}

impl FromStr for RegisterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holding" => Ok(RegisterType::Holding),
            "input" => Ok(RegisterType::Input),
            "coil" => Ok(RegisterType::Coil),
            "discrete" => Ok(RegisterType::Discrete),
            other => Err(format!("unknown register_type '{other}'")),
        }
    }
}

/// Framing variant used on the gateway's TCP socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Framer {
    #[default]
    Rtu,
    Socket,
    Ascii,
}

impl fmt::Display for Framer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Framer::Rtu => "RTU",
            Framer::Socket => "SOCKET",
            Framer::Ascii => "ASCII",
        };
        f.write_str(s)
    }
}

impl FromStr for Framer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RTU" => Ok(Framer::Rtu),
            "SOCKET" => Ok(Framer::Socket),
            "ASCII" => Ok(Framer::Ascii),
            other => Err(format!("unknown framer '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_type_limits() {
        assert_eq!(RegisterType::Holding.max_count(), 125);
        assert_eq!(RegisterType::Coil.max_count(), 2000);
        assert!(RegisterType::Holding.is_writable());
        assert!(!RegisterType::Input.is_writable());
    }

    #[test]
    fn framer_roundtrip() {
        for framer in [Framer::Rtu, Framer::Socket, Framer::Ascii] {
            let text = framer.to_string();
            assert_eq!(text.parse::<Framer>().unwrap(), framer);
        }
    }
}
