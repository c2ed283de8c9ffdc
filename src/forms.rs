/*!
 * Submitted form parsing and field validation.
 *
 * Browsers post either `application/x-www-form-urlencoded` or
 * `multipart/form-data` (whenever a form carries a file input); both end up
 * as a `FormData` so handlers do not care which one arrived.
 */
use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;
use futures_util::future::ready;
use futures_util::stream::once;
use log::*;
use serde::Serialize;
use tide::Request;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
    files: Vec<(String, UploadedFile)>,
}

impl FormData {
    pub async fn from_request<State>(req: &mut Request<State>) -> tide::Result<Self>
    where
        State: Clone + Send + Sync + 'static,
    {
        let content_type = req
            .header("Content-Type")
            .map(|v| v.last().as_str().to_string())
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            let body = req.body_bytes().await?;
            Ok(Self::from_multipart(&content_type, body).await?)
        } else {
            let fields: Vec<(String, String)> = req.body_form().await.map_err(|e| {
                debug!("Unparseable form body: {}", e);
                AppError::BadRequest("malformed form body".into())
            })?;
            Ok(Self {
                fields,
                files: vec![],
            })
        }
    }

    pub async fn from_multipart(content_type: &str, body: Vec<u8>) -> Result<Self, AppError> {
        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| AppError::BadRequest(format!("bad multipart boundary: {}", e)))?;
        let stream = once(ready(Ok::<_, std::io::Error>(Bytes::from(body))));
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field.bytes().await.map_err(multipart_error)?;
                    // an untouched file input still sends an empty part
                    if !file_name.is_empty() && !data.is_empty() {
                        form.files.push((
                            name,
                            UploadedFile {
                                file_name,
                                content_type,
                                data,
                            },
                        ));
                    }
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.push((name, value));
                }
            }
        }
        Ok(form)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted under `name`, in order
    pub fn get_list(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    /**
     * A trimmed text field. Blank values count as missing.
     */
    pub fn char_field(
        &self,
        name: &'static str,
        max_length: usize,
        required: bool,
        errors: &mut FormErrors,
    ) -> Option<String> {
        let value = self.get(name).map(str::trim).unwrap_or_default();
        if value.is_empty() {
            if required {
                errors.add(name, REQUIRED);
            }
            return None;
        }
        let length = value.chars().count();
        if length > max_length {
            errors.add(
                name,
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max_length, length
                ),
            );
            return None;
        }
        Some(value.to_string())
    }

    pub fn int_field(&self, name: &'static str, required: bool, errors: &mut FormErrors) -> Option<i64> {
        match self.get(name).map(str::trim).filter(|v| !v.is_empty()) {
            None => {
                if required {
                    errors.add(name, REQUIRED);
                }
                None
            }
            Some(raw) => match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    errors.add(name, "Enter a whole number.");
                    None
                }
            },
        }
    }

    pub fn email_field(
        &self,
        name: &'static str,
        max_length: usize,
        required: bool,
        errors: &mut FormErrors,
    ) -> Option<String> {
        let value = self.char_field(name, max_length, required, errors)?;
        if lettre::Address::from_str(&value).is_err() {
            errors.add(name, "Enter a valid email address.");
            return None;
        }
        Some(value)
    }

    /**
     * Non-empty values of a multi-select or repeated input, parsed as ids
     */
    pub fn id_list(&self, name: &'static str, errors: &mut FormErrors) -> Vec<i64> {
        let mut ids = vec![];
        for raw in self.get_list(name).into_iter().filter(|v| !v.trim().is_empty()) {
            match raw.trim().parse() {
                Ok(id) => ids.push(id),
                Err(_) => errors.add(name, format!("Select a valid choice. {} is not one of the available choices.", raw)),
            }
        }
        ids
    }

    /// Field values to echo back into a re-rendered form
    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|(k, _)| !k.contains("password"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn multipart_error(e: multer::Error) -> AppError {
    AppError::BadRequest(format!("malformed multipart body: {}", e))
}

pub const REQUIRED: &str = "This field is required.";

/**
 * Validation messages collected while cleaning a form
 */
#[derive(Clone, Debug, Default, Serialize)]
pub struct FormErrors {
    pub non_field: Vec<String>,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.non_field.is_empty() && self.fields.is_empty()
    }
}

#[cfg(test)]
pub mod testing {
    /// Hand-assembled multipart bodies for handler tests
    pub const BOUNDARY: &str = "polls-site-test-boundary";

    pub enum Part<'a> {
        Text(&'a str, &'a str),
        File {
            name: &'a str,
            file_name: &'a str,
            content_type: &'a str,
            data: &'a [u8],
        },
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    pub fn body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", name, value)
                            .as_bytes(),
                    );
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, file_name, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }
}
