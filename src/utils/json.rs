use axum::extract::FromRequest;
use serde::{Deserialize, Deserializer};

use crate::error::AppError;

/// `axum::Json` whose rejections render through [`AppError`] as 400s.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Tells an absent field (`None`) apart from an explicit `null` (`Some(None)`).
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        owner: Option<Option<u32>>,
    }

    #[test]
    fn test_double_option() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.owner, None);
        let cleared: Patch = serde_json::from_str(r#"{"owner": null}"#).unwrap();
        assert_eq!(cleared.owner, Some(None));
        let set: Patch = serde_json::from_str(r#"{"owner": 7}"#).unwrap();
        assert_eq!(set.owner, Some(Some(7)));
    }
}
