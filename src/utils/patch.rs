use serde::{Deserialize, Deserializer};

/// Deserializes a clearable patch field.
///
/// Pair with `#[serde(default)]`: a missing key stays `None` (leave as is),
/// an explicit `null` becomes `Some(None)` (clear) and a value becomes
/// `Some(Some(v))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
