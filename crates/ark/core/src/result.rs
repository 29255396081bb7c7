use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "result", content = "spec")]
pub enum Result<T> {
    Ok(T),
    Err(String),
}

impl<T, E> From<::core::result::Result<T, E>> for Result<T>
where
    E: ToString,
{
    fn from(value: ::core::result::Result<T, E>) -> Self {
        match value {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Err(error.to_string()),
        }
    }
}
