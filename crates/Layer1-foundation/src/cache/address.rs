//! Content addressing for render cache keys
//!
//! A [`Fingerprint`] is a SHA-256 digest over the component name, the
//! canonically serialized parameters, and the content digests of every file
//! the component depends on. Identical inputs always yield identical
//! fingerprints regardless of map insertion order or container type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Read buffer size for file hashing
const CHUNK_SIZE: usize = 64 * 1024;

/// Component parameters, keyed by name
pub type Params = BTreeMap<String, ParamValue>;

// ============================================================================
// ParamValue
// ============================================================================

/// A structured parameter value as supplied by the host application
///
/// Every variant except [`ParamValue::Opaque`] has a deterministic canonical
/// form (see [`normalize`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Arbitrary-precision decimal, kept as its literal text
    Decimal(String),
    Str(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
    Path(PathBuf),
    List(Vec<ParamValue>),
    /// Unordered collection; normalized to a sorted sequence
    Set(Vec<ParamValue>),
    Map(Params),
    /// Already-JSON value, passed through with keys re-sorted
    Json(Value),
    /// A live handle with no canonical form (socket, file handle, ...)
    Opaque(String),
}

impl ParamValue {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        ParamValue::Bytes(data.into())
    }

    pub fn decimal(text: impl Into<String>) -> Self {
        ParamValue::Decimal(text.into())
    }

    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ParamValue>,
    {
        ParamValue::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn opaque(type_name: impl Into<String>) -> Self {
        ParamValue::Opaque(type_name.into())
    }

    fn type_name(&self) -> &str {
        match self {
            ParamValue::Opaque(name) => name,
            _ => "value",
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        ParamValue::Int(n as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<u64> for ParamValue {
    fn from(n: u64) -> Self {
        ParamValue::UInt(n)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Float(n)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(dt: DateTime<Utc>) -> Self {
        ParamValue::DateTime(dt)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(dt: NaiveDateTime) -> Self {
        ParamValue::NaiveDateTime(dt)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(d: NaiveDate) -> Self {
        ParamValue::Date(d)
    }
}

impl From<PathBuf> for ParamValue {
    fn from(p: PathBuf) -> Self {
        ParamValue::Path(p)
    }
}

impl From<&Path> for ParamValue {
    fn from(p: &Path) -> Self {
        ParamValue::Path(p.to_path_buf())
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Json(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

impl<T: Into<ParamValue>> From<BTreeSet<T>> for ParamValue {
    fn from(items: BTreeSet<T>) -> Self {
        ParamValue::set(items)
    }
}

impl<T: Into<ParamValue>> From<HashSet<T>> for ParamValue {
    fn from(items: HashSet<T>) -> Self {
        ParamValue::set(items)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> From<HashMap<K, V>> for ParamValue {
    fn from(map: HashMap<K, V>) -> Self {
        ParamValue::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<Params> for ParamValue {
    fn from(map: Params) -> Self {
        ParamValue::Map(map)
    }
}

// ============================================================================
// Digests
// ============================================================================

/// SHA-256 digest of a single input (parameters or one file), lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render cache key: digest over component name, params and file digests
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-computed key (e.g. one read back from stats or logs)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Convert a parameter value into its canonical JSON form
///
/// Dates become ISO-8601 strings, decimals their literal text, byte
/// sequences lowercase hex, paths their lossy string form, and sets a sorted
/// sequence. Fails only for [`ParamValue::Opaque`].
pub fn normalize(value: &ParamValue) -> Result<Value> {
    normalize_at(value, "$")
}

fn normalize_at(value: &ParamValue, path: &str) -> Result<Value> {
    Ok(match value {
        ParamValue::Null => Value::Null,
        ParamValue::Bool(b) => Value::Bool(*b),
        ParamValue::Int(n) => Value::from(*n),
        ParamValue::UInt(n) => Value::from(*n),
        ParamValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None if f.is_nan() => Value::String("NaN".to_string()),
            None if *f > 0.0 => Value::String("Infinity".to_string()),
            None => Value::String("-Infinity".to_string()),
        },
        ParamValue::Decimal(text) => Value::String(text.clone()),
        ParamValue::Str(s) => Value::String(s.clone()),
        ParamValue::Bytes(bytes) => Value::String(to_hex(bytes)),
        ParamValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        ParamValue::NaiveDateTime(dt) => {
            Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ParamValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        ParamValue::Path(p) => Value::String(p.to_string_lossy().into_owned()),
        ParamValue::List(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_at(item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>>>()?,
        ),
        ParamValue::Set(items) => {
            let mut normalized = items
                .iter()
                .enumerate()
                .map(|(i, item)| normalize_at(item, &format!("{}{{{}}}", path, i)))
                .collect::<Result<Vec<_>>>()?;
            // Order by canonical text so the result is independent of iteration order
            normalized.sort_by_cached_key(canonical_json);
            normalized.dedup();
            Value::Array(normalized)
        }
        ParamValue::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.clone(), normalize_at(item, &format!("{}.{}", path, key))?);
            }
            Value::Object(out)
        }
        ParamValue::Json(v) => v.clone(),
        ParamValue::Opaque(_) => return Err(Error::unsupported_type(path, value.type_name())),
    })
}

/// Serialize a JSON value with sorted keys and no whitespace
///
/// Key order is imposed here rather than trusted to the map type.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<_> = obj.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Serializing a str to JSON cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = obj.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ============================================================================
// Fingerprinting
// ============================================================================

/// Digest the canonical serialization of a parameter map
pub fn fingerprint_params(params: &Params) -> Result<ContentDigest> {
    let mut canonical = Map::new();
    for (key, value) in params {
        canonical.insert(key.clone(), normalize_at(value, &format!("$.{}", key))?);
    }
    let text = canonical_json(&Value::Object(canonical));
    Ok(ContentDigest(format!("{:x}", Sha256::digest(text.as_bytes()))))
}

/// Digest a file's bytes, reading it in bounded chunks
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<ContentDigest> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::file_unreadable(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::file_unreadable(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentDigest(format!("{:x}", hasher.finalize())))
}

/// Combine component name, params digest and file digests into a fingerprint
///
/// Each part is length-prefixed, and file digests keep the caller's order.
pub fn combine(
    component_name: &str,
    params_digest: &ContentDigest,
    file_digests: &[ContentDigest],
) -> Fingerprint {
    let mut hasher = Sha256::new();
    let mut push = |part: &[u8]| {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    };
    push(component_name.as_bytes());
    push(params_digest.as_str().as_bytes());
    for digest in file_digests {
        push(digest.as_str().as_bytes());
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Full fingerprint for a render request: params plus every dependency file
pub fn fingerprint<P: AsRef<Path>>(
    component_name: &str,
    params: &Params,
    file_paths: &[P],
) -> Result<Fingerprint> {
    let params_digest = fingerprint_params(params)?;
    let file_digests = file_paths
        .iter()
        .map(|path| fingerprint_file(path))
        .collect::<Result<Vec<_>>>()?;
    Ok(combine(component_name, &params_digest, &file_digests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn params(pairs: Vec<(&str, ParamValue)>) -> Params {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_params_order_independent() {
        let mut a = HashMap::new();
        a.insert("text", ParamValue::from("Go"));
        a.insert("size", ParamValue::from(3));
        let mut b = HashMap::new();
        b.insert("size", ParamValue::from(3));
        b.insert("text", ParamValue::from("Go"));

        let pa = params(vec![("inner", ParamValue::from(a))]);
        let pb = params(vec![("inner", ParamValue::from(b))]);
        assert_eq!(fingerprint_params(&pa).unwrap(), fingerprint_params(&pb).unwrap());
    }

    #[test]
    fn test_json_passthrough_sorted() {
        let a = params(vec![("cfg", json!({"b": 1, "a": {"y": 2, "x": 3}}).into())]);
        let b = params(vec![("cfg", json!({"a": {"x": 3, "y": 2}, "b": 1}).into())]);
        assert_eq!(fingerprint_params(&a).unwrap(), fingerprint_params(&b).unwrap());
    }

    #[test]
    fn test_set_container_independent() {
        let hs: HashSet<&str> = ["red", "green", "blue"].into_iter().collect();
        let bs: BTreeSet<&str> = ["blue", "green", "red"].into_iter().collect();
        assert_eq!(
            normalize(&ParamValue::from(hs)).unwrap(),
            normalize(&ParamValue::from(bs)).unwrap()
        );
        assert_eq!(
            normalize(&ParamValue::set(vec!["b", "a"])).unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn test_normalize_scalars() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 11).unwrap();
        let dt = date.and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(normalize(&date.into()).unwrap(), json!("2025-12-11"));
        assert_eq!(normalize(&dt.into()).unwrap(), json!("2025-12-11T10:30:00"));
        assert_eq!(normalize(&ParamValue::bytes(vec![0xde, 0xad])).unwrap(), json!("dead"));
        assert_eq!(normalize(&ParamValue::decimal("10.50")).unwrap(), json!("10.50"));
        assert_eq!(
            normalize(&PathBuf::from("/tmp/test").into()).unwrap(),
            json!("/tmp/test")
        );
        assert_eq!(normalize(&f64::NAN.into()).unwrap(), json!("NaN"));
        assert_eq!(normalize(&f64::NEG_INFINITY.into()).unwrap(), json!("-Infinity"));
    }

    #[test]
    fn test_opaque_rejected_with_path() {
        let p = params(vec![(
            "conn",
            ParamValue::List(vec![ParamValue::Null, ParamValue::opaque("TcpStream")]),
        )]);
        match fingerprint_params(&p) {
            Err(Error::UnsupportedType { path, type_name }) => {
                assert_eq!(path, "$.conn[1]");
                assert_eq!(type_name, "TcpStream");
            }
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_digest_shape() {
        let digest = fingerprint_params(&Params::new()).unwrap();
        assert_eq!(digest.as_str().len(), 64);
        assert!(digest.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_digest_sensitivity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<button>{{ text }}</button>").unwrap();
        let before = fingerprint_file(file.path()).unwrap();

        file.write_all(b" ").unwrap();
        let after = fingerprint_file(file.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_file_propagates() {
        let err = fingerprint_file("/definitely/not/here.html").unwrap_err();
        assert!(matches!(err, Error::FileUnreadable { .. }));
    }

    #[test]
    fn test_combine_order_matters() {
        let p = fingerprint_params(&Params::new()).unwrap();
        let a = ContentDigest("aa".into());
        let b = ContentDigest("bb".into());
        assert_ne!(
            combine("card", &p, &[a.clone(), b.clone()]),
            combine("card", &p, &[b, a])
        );
    }

    #[test]
    fn test_combine_component_matters() {
        let p = fingerprint_params(&Params::new()).unwrap();
        assert_ne!(combine("card", &p, &[]), combine("button", &p, &[]));
    }
}
