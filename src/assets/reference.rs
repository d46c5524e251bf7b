use crate::foundation::error::{MetavisError, MvResult};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Stable identifier plus URI for an asset. Does not own the asset and is
/// freely copied.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AssetReference {
    /// Stable identifier used for cache keys and diagnostics.
    pub id: String,
    /// Asset URI, `scheme://path[?query]`.
    pub uri: String,
}

impl AssetReference {
    /// Reference a file-backed asset.
    pub fn file(id: impl Into<String>, path: impl Into<String>) -> AssetReference {
        AssetReference {
            id: id.into(),
            uri: format!("file:{}", path.into()),
        }
    }

    /// Reference a procedural asset, e.g. `ligm://video/smpte_bars`.
    pub fn ligm(id: impl Into<String>, kind_and_query: impl Into<String>) -> AssetReference {
        AssetReference {
            id: id.into(),
            uri: format!("ligm://{}", kind_and_query.into()),
        }
    }

    /// Parse the URI into a resolved location.
    pub fn resolve(&self) -> MvResult<ResolvedAsset> {
        parse_uri(&self.uri)
    }

    /// Stable 64-bit seed for deterministic procedural state.
    pub(crate) fn seed(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.id.as_bytes())
    }
}

/// A parsed asset URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedAsset {
    /// File-backed media or still image.
    File {
        /// Filesystem path.
        path: PathBuf,
    },
    /// Procedural LIGM source.
    Ligm {
        /// Generator kind, e.g. `video/zone_plate`.
        kind: String,
        /// Decoded query parameters.
        query: BTreeMap<String, String>,
    },
}

fn parse_uri(uri: &str) -> MvResult<ResolvedAsset> {
    if let Some(rest) = uri.strip_prefix("file:") {
        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(MetavisError::asset(format!("empty file path in '{uri}'")));
        }
        return Ok(ResolvedAsset::File {
            path: PathBuf::from(path),
        });
    }

    if let Some(rest) = uri.strip_prefix("ligm://") {
        let (kind, query) = match rest.split_once('?') {
            Some((k, q)) => (k, Some(q)),
            None => (rest, None),
        };
        if kind.is_empty() {
            return Err(MetavisError::asset(format!("empty ligm kind in '{uri}'")));
        }
        let mut params = BTreeMap::new();
        if let Some(q) = query {
            for pair in q.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => params.insert(k.to_owned(), v.to_owned()),
                    None => params.insert(pair.to_owned(), String::new()),
                };
            }
        }
        return Ok(ResolvedAsset::Ligm {
            kind: kind.to_owned(),
            query: params,
        });
    }

    let scheme = uri.split(':').next().unwrap_or(uri);
    Err(MetavisError::asset(format!(
        "unsupported asset scheme '{scheme}' in '{uri}'"
    )))
}

/// Fetch a required float query parameter.
pub(crate) fn query_f64(
    query: &BTreeMap<String, String>,
    key: &str,
    default: f64,
) -> MvResult<f64> {
    match query.get(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<f64>().map_err(|_| {
            MetavisError::asset(format!("query parameter '{key}'='{raw}' is not a number"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_resolves_to_path() {
        let a = AssetReference::file("clip1", "/media/foo.mov");
        assert_eq!(
            a.resolve().unwrap(),
            ResolvedAsset::File {
                path: PathBuf::from("/media/foo.mov")
            }
        );
    }

    #[test]
    fn ligm_uri_with_query_parses_params() {
        let a = AssetReference::ligm("tone", "audio/sine?freq=1000");
        match a.resolve().unwrap() {
            ResolvedAsset::Ligm { kind, query } => {
                assert_eq!(kind, "audio/sine");
                assert_eq!(query.get("freq").map(String::as_str), Some("1000"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_scheme_is_an_asset_error() {
        let a = AssetReference {
            id: "x".into(),
            uri: "gopher://nope".into(),
        };
        let err = a.resolve().unwrap_err();
        assert!(err.to_string().contains("unsupported asset scheme"));
    }

    #[test]
    fn seed_is_stable_per_id() {
        let a = AssetReference::ligm("noise", "audio/white_noise");
        let b = AssetReference::ligm("noise", "audio/white_noise");
        assert_eq!(a.seed(), b.seed());
    }
}
