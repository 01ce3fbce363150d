//! Where packages come from.
//!
//! Sources serialize as prefixed strings:
//! - `registry+https://a.example,https://b.example`
//! - `git+https://host/repo.git?ref=main&rev=4f2a9c`
//! - `path+vendor/widget?digest=9b1e…`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::ParseError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Registry {
        remotes: Vec<String>,
    },
    Git {
        uri: String,
        reference: Option<String>,
        revision: Option<String>,
    },
    Path {
        path: String,
        digest: Option<String>,
    },
}

impl Source {
    pub fn registry<S: Into<String>>(remotes: impl IntoIterator<Item = S>) -> Self {
        Source::Registry {
            remotes: remotes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Source::Path {
            path: path.into(),
            digest: None,
        }
    }

    pub fn git(uri: impl Into<String>, reference: Option<&str>) -> Self {
        Source::Git {
            uri: uri.into(),
            reference: reference.map(str::to_string),
            revision: None,
        }
    }

    /// Short name used to unlock a source by name: the repository or
    /// directory basename, or `registry`.
    pub fn name(&self) -> String {
        match self {
            Source::Registry { .. } => "registry".to_string(),
            Source::Git { uri, .. } => basename(uri).trim_end_matches(".git").to_string(),
            Source::Path { path, .. } => basename(path).to_string(),
        }
    }

    /// Local sources are read from disk and can change between runs without
    /// any change to the declarations.
    pub fn is_local(&self) -> bool {
        matches!(self, Source::Path { .. } | Source::Git { .. })
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, Source::Registry { .. })
    }

    /// Whether a package locked from `self` may stand in for a package
    /// requested from `other`.
    pub fn includes(&self, other: &Source) -> bool {
        match (self, other) {
            (Source::Registry { remotes }, Source::Registry { remotes: wanted }) => {
                wanted.iter().all(|r| remotes.contains(r))
            }
            (
                Source::Git { uri, reference, .. },
                Source::Git {
                    uri: other_uri,
                    reference: other_ref,
                    ..
                },
            ) => uri == other_uri && reference == other_ref,
            (Source::Path { .. }, Source::Path { .. }) => self.equivalent(other),
            _ => false,
        }
    }

    /// Whether two declarations name the same source. Pinned git revisions are
    /// ignored; path sources with the same known content digest are equal even
    /// when they moved.
    pub fn equivalent(&self, other: &Source) -> bool {
        match (self, other) {
            (Source::Registry { remotes }, Source::Registry { remotes: theirs }) => {
                let mut a = remotes.clone();
                let mut b = theirs.clone();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            (Source::Git { .. }, Source::Git { .. }) => self.includes(other),
            (
                Source::Path { path, digest },
                Source::Path {
                    path: other_path,
                    digest: other_digest,
                },
            ) => match (digest, other_digest) {
                (Some(a), Some(b)) => a == b,
                _ => path == other_path,
            },
            _ => false,
        }
    }

    /// Whether a package listed under `other` can be served by the source
    /// declared as `self`. Pins are ignored and registries only need to
    /// share a remote.
    pub fn serves(&self, other: &Source) -> bool {
        match (self, other) {
            (Source::Registry { remotes }, Source::Registry { remotes: theirs }) => {
                theirs.iter().any(|r| remotes.contains(r))
            }
            _ => self.unpinned().equivalent(&other.unpinned()),
        }
    }

    /// The same source with its pinned revision or content digest cleared.
    pub fn unpinned(&self) -> Source {
        match self {
            Source::Git { uri, reference, .. } => Source::Git {
                uri: uri.clone(),
                reference: reference.clone(),
                revision: None,
            },
            Source::Path { path, .. } => Source::Path {
                path: path.clone(),
                digest: None,
            },
            other => other.clone(),
        }
    }
}

fn basename(location: &str) -> &str {
    location
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(location)
}

fn parse_params<'a>(
    query: &'a str,
    text: &str,
) -> Result<Vec<(&'a str, &'a str)>, ParseError> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .ok_or_else(|| ParseError::new("source", text, format!("bad parameter `{pair}`")))
        })
        .collect()
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Registry { remotes } => write!(f, "registry+{}", remotes.join(",")),
            Source::Git {
                uri,
                reference,
                revision,
            } => {
                write!(f, "git+{uri}")?;
                let mut params = Vec::new();
                if let Some(r) = reference {
                    params.push(format!("ref={r}"));
                }
                if let Some(r) = revision {
                    params.push(format!("rev={r}"));
                }
                if !params.is_empty() {
                    write!(f, "?{}", params.join("&"))?;
                }
                Ok(())
            }
            Source::Path { path, digest } => {
                write!(f, "path+{path}")?;
                if let Some(d) = digest {
                    write!(f, "?digest={d}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Source {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (kind, rest) = text
            .split_once('+')
            .ok_or_else(|| ParseError::new("source", s, "expected `<kind>+<location>`"))?;
        let (location, query) = match rest.rsplit_once('?') {
            Some((location, query)) => (location, query),
            None => (rest, ""),
        };
        if location.is_empty() {
            return Err(ParseError::new("source", s, "missing location"));
        }
        let params = parse_params(query, s)?;
        let param = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        };

        match kind {
            "registry" => {
                if !query.is_empty() {
                    return Err(ParseError::new("source", s, "registry sources take no parameters"));
                }
                let remotes: Vec<String> = location.split(',').map(|r| r.trim().to_string()).collect();
                if remotes.iter().any(String::is_empty) {
                    return Err(ParseError::new("source", s, "empty registry remote"));
                }
                Ok(Source::Registry { remotes })
            }
            "git" => Ok(Source::Git {
                uri: location.to_string(),
                reference: param("ref"),
                revision: param("rev"),
            }),
            "path" => Ok(Source::Path {
                path: location.to_string(),
                digest: param("digest"),
            }),
            other => Err(ParseError::new(
                "source",
                s,
                format!("unknown source kind `{other}`"),
            )),
        }
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
