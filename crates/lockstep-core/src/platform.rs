use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::ParseError;

/// A target platform a package build can run on.
///
/// `Pure` builds run anywhere. Specific platforms are `cpu-os[-abi]` triples,
/// where a lone token such as `java` names an OS with no fixed cpu.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Pure,
    Specific {
        cpu: Option<String>,
        os: String,
        abi: Option<String>,
    },
}

impl Platform {
    pub fn specific(cpu: Option<&str>, os: &str, abi: Option<&str>) -> Self {
        Platform::Specific {
            cpu: cpu.map(str::to_string),
            os: os.to_string(),
            abi: abi.map(str::to_string),
        }
    }

    /// The platform of the running host.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        Platform::specific(Some(std::env::consts::ARCH), os, None)
    }

    pub fn is_pure(&self) -> bool {
        matches!(self, Platform::Pure)
    }

    /// Whether a build for `self` can run on `target`.
    ///
    /// A specific build matches a target on the same OS when its cpu is
    /// unset, `universal` or equal, and its abi is unset or equal.
    pub fn matches(&self, target: &Platform) -> bool {
        match (self, target) {
            (Platform::Pure, _) => true,
            (Platform::Specific { .. }, Platform::Pure) => false,
            (
                Platform::Specific { cpu, os, abi },
                Platform::Specific {
                    cpu: target_cpu,
                    os: target_os,
                    abi: target_abi,
                },
            ) => {
                let cpu_ok = match cpu.as_deref() {
                    None | Some("universal") => true,
                    Some(c) => target_cpu.as_deref() == Some(c),
                };
                let abi_ok = abi.is_none() || abi == target_abi;
                os == target_os && cpu_ok && abi_ok
            }
        }
    }

    /// Rank of `self` as a build for `target`: 3 exact, 2 alias, 1 pure, 0 no match.
    pub fn specificity(&self, target: &Platform) -> u8 {
        if self == target && !self.is_pure() {
            3
        } else if self.is_pure() {
            1
        } else if self.matches(target) {
            2
        } else {
            0
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Pure
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Pure => f.write_str("pure"),
            Platform::Specific { cpu, os, abi } => {
                if let Some(cpu) = cpu {
                    write!(f, "{cpu}-")?;
                }
                f.write_str(os)?;
                if let Some(abi) = abi {
                    write!(f, "-{abi}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text == "pure" {
            return Ok(Platform::Pure);
        }
        let parts: Vec<&str> = text.split('-').collect();
        if parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.'))
        {
            return Err(ParseError::new("platform", s, "expected `pure` or `cpu-os[-abi]`"));
        }
        Ok(match parts.as_slice() {
            [os] => Platform::specific(None, os, None),
            [cpu, os] => Platform::specific(Some(cpu), os, None),
            [cpu, os, abi @ ..] => Platform::specific(Some(cpu), os, Some(&abi.join("-"))),
            [] => return Err(ParseError::new("platform", s, "empty platform")),
        })
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
