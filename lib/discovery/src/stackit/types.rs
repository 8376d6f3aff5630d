use serde::{Deserialize, Deserializer};

/// Response object for list requests of the STACKIT APIs.
///
/// `items` is `None` if the field is missing or `null`, and `Some` but empty
/// for `[]`. Both mean there is nothing to discover.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
pub struct ListResponse<T> {
    #[serde(default)]
    pub items: Option<Vec<T>>,
}

/// MongoDB Flex instance, unknown fields are ignored.
///
/// https://docs.api.eu01.stackit.cloud/documentation/mongodb-flex-service/version/v2#tag/instance
#[derive(Debug, Deserialize, PartialEq)]
pub struct MongoDbFlex {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
}

// `null` is treated like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    type Response = Option<ListResponse<MongoDbFlex>>;

    #[test]
    fn absent_and_empty() {
        let resp: Response = serde_json::from_str("null").unwrap();
        assert!(resp.is_none());

        let resp: Response = serde_json::from_str("{}").unwrap();
        assert!(resp.unwrap().items.is_none());

        let resp: Response = serde_json::from_str(r#"{"items":null}"#).unwrap();
        assert!(resp.unwrap().items.is_none());

        let resp: Response = serde_json::from_str(r#"{"items":[]}"#).unwrap();
        assert_eq!(resp.unwrap().items, Some(vec![]));
    }

    #[test]
    fn lenient_instance() {
        let input = r#"{
            "items": [
                {
                    "id": "abc",
                    "name": null,
                    "status": "READY",
                    "flavor": {"cpu": 2, "memory": 4},
                    "version": "7.0"
                },
                {"id": "xyz"}
            ]
        }"#;

        let resp: Response = serde_json::from_str(input).unwrap();
        let items = resp.unwrap().items.unwrap();
        assert_eq!(
            items,
            vec![
                MongoDbFlex {
                    id: "abc".into(),
                    name: "".into(),
                    status: "READY".into(),
                },
                MongoDbFlex {
                    id: "xyz".into(),
                    name: "".into(),
                    status: "".into(),
                }
            ]
        );
    }

    #[test]
    fn wrong_types() {
        assert!(serde_json::from_str::<Response>(r#"{"items":[{"id":1}]}"#).is_err());
        assert!(serde_json::from_str::<Response>(r#"{"items":{"id":"abc"}}"#).is_err());
    }
}
