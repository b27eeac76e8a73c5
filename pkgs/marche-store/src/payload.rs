//! Send-message payload and its validation

use crate::error::{Error, Result};
use crate::message_type::{MediaPolicy, MessageType};
use base64::Engine;
use bytes::Bytes;

/// File attached to a message
#[derive(Debug, Clone)]
pub struct Attachment {
    pub bytes: Bytes,
    /// Name supplied by the client, used to derive the stored file name
    pub file_name: Option<String>,
    /// Declared MIME type, if any
    pub mime: Option<String>,
}

impl Attachment {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
            mime: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Decode inline file data, either a `data:<mime>;base64,<payload>` URI or
    /// bare base64.
    pub fn from_data_uri(data: &str) -> Result<Self> {
        let data = data.trim();
        let (mime, encoded) = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, encoded) = rest.split_once(',').ok_or_else(|| {
                    Error::validation("file_data", "data URI is missing its payload")
                })?;
                let mut parts = header.split(';');
                let mime = parts.next().unwrap_or_default().trim();
                if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
                    return Err(Error::validation(
                        "file_data",
                        "only base64 data URIs are supported",
                    ));
                }
                let mime = (!mime.is_empty()).then(|| mime.to_ascii_lowercase());
                (mime, encoded)
            }
            None => (None, data),
        };

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::validation("file_data", format!("unparseable base64 payload: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::validation("file_data", "file data is empty"));
        }

        Ok(Self {
            bytes: Bytes::from(bytes),
            file_name: None,
            mime,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Effective MIME type: the declared one unless it is the generic
    /// octet-stream, otherwise a guess from the file name.
    pub fn effective_mime(&self) -> Option<String> {
        let declared = self
            .mime
            .as_deref()
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty() && m != "application/octet-stream");
        declared.or_else(|| {
            self.file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.essence_str().to_string())
        })
    }

    /// Stored file name: `<slug>-<unique>.<ext>`.
    pub fn storage_name(&self, message_type: MessageType) -> String {
        let (stem, ext) = match self.file_name.as_deref() {
            Some(name) => match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                    (stem.to_string(), Some(ext.to_ascii_lowercase()))
                }
                _ => (name.to_string(), None),
            },
            None => (message_type.as_str().to_string(), None),
        };

        let ext = ext
            .map(|e| slugify(&e))
            .filter(|e| !e.is_empty())
            .or_else(|| {
                self.effective_mime().and_then(|m| {
                    mime_guess::get_mime_extensions_str(&m)
                        .and_then(|exts| exts.first())
                        .map(|e| e.to_string())
                })
            });

        let mut slug = slugify(&stem);
        if slug.is_empty() {
            slug = message_type.as_str().to_string();
        }
        slug.truncate(60);
        let slug = slug.trim_end_matches('-');

        let unique = uuid::Uuid::new_v4().simple().to_string();
        match ext {
            Some(ext) => format!("{}-{}.{}", slug, &unique[..12], ext),
            None => format!("{}-{}", slug, &unique[..12]),
        }
    }
}

/// Lowercase ASCII slug with `-` separators
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Optional location attached to a message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// A message as submitted by a client
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_type: MessageType,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Text,
            content: Some(content.into()),
            attachment: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn media(message_type: MessageType, attachment: Attachment) -> Self {
        Self {
            message_type,
            content: None,
            attachment: Some(attachment),
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// Check the payload against the rules of its type.
    pub fn validate(self) -> Result<ValidatedMessage> {
        let location = self.location()?;
        let content = self
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let Some(policy) = self.message_type.policy() else {
            if self.attachment.is_some() {
                return Err(Error::validation(
                    "file",
                    "text messages cannot carry a file",
                ));
            }
            let content =
                content.ok_or_else(|| Error::validation("content", "content is required"))?;
            return Ok(ValidatedMessage {
                message_type: MessageType::Text,
                content,
                upload: None,
                location,
            });
        };

        let attachment = self
            .attachment
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::validation("file", "file required for this type"))?;

        if attachment.len() > policy.max_bytes {
            return Err(Error::PayloadTooLarge {
                message_type: self.message_type,
                size: attachment.len(),
                max_bytes: policy.max_bytes,
            });
        }

        if let Some(mime) = attachment.effective_mime() {
            if !policy.allows_mime(&mime) {
                return Err(Error::validation(
                    "file",
                    format!("{} is not accepted for {} messages", mime, self.message_type),
                ));
            }
        }

        let file_name = attachment.storage_name(self.message_type);
        Ok(ValidatedMessage {
            message_type: self.message_type,
            content: content.unwrap_or_else(|| policy.placeholder.to_string()),
            upload: Some(PendingUpload {
                policy,
                file_name,
                bytes: attachment.bytes,
            }),
            location,
        })
    }

    fn location(&self) -> Result<Option<Location>> {
        match (self.latitude, self.longitude) {
            (None, None) => Ok(None),
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) {
                    return Err(Error::validation("latitude", "must be within [-90, 90]"));
                }
                if !(-180.0..=180.0).contains(&longitude) {
                    return Err(Error::validation("longitude", "must be within [-180, 180]"));
                }
                Ok(Some(Location {
                    latitude,
                    longitude,
                }))
            }
            (Some(_), None) => Err(Error::validation(
                "longitude",
                "latitude and longitude go together",
            )),
            (None, Some(_)) => Err(Error::validation(
                "latitude",
                "latitude and longitude go together",
            )),
        }
    }
}

/// Payload that passed validation, ready to be persisted
#[derive(Debug, Clone)]
pub struct ValidatedMessage {
    pub message_type: MessageType,
    pub content: String,
    pub upload: Option<PendingUpload>,
    pub location: Option<Location>,
}

/// File waiting to be pushed to the media store
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub policy: &'static MediaPolicy,
    pub file_name: String,
    pub bytes: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_data_uri() {
        let att = Attachment::from_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(&att.bytes[..], b"hello");
        assert_eq!(att.mime.as_deref(), Some("image/png"));
    }

    #[test]
    fn decodes_bare_base64() {
        let att = Attachment::from_data_uri("aGVsbG8=").unwrap();
        assert_eq!(&att.bytes[..], b"hello");
        assert!(att.mime.is_none());
    }

    #[test]
    fn rejects_garbage_base64() {
        let err = Attachment::from_data_uri("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "file_data"));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Devis Plomberie (v2)"), "devis-plomberie-v2");
        assert_eq!(slugify("__photo__"), "photo");
        assert_eq!(slugify("éé"), "");
    }

    #[test]
    fn storage_name_keeps_extension() {
        let att = Attachment::new(&b"%PDF"[..]).with_file_name("Mon Devis.PDF");
        let name = att.storage_name(MessageType::Document);
        assert!(name.starts_with("mon-devis-"), "{}", name);
        assert!(name.ends_with(".pdf"), "{}", name);
    }

    #[test]
    fn storage_name_falls_back_to_type_and_mime() {
        let att = Attachment::new(&b"x"[..]).with_mime("image/png");
        let name = att.storage_name(MessageType::Image);
        assert!(name.starts_with("image-"), "{}", name);
        assert!(name.ends_with(".png"), "{}", name);
    }

    #[test]
    fn image_without_content_gets_placeholder() {
        let msg = NewMessage::media(
            MessageType::Image,
            Attachment::new(&b"png"[..]).with_mime("image/png"),
        )
        .validate()
        .unwrap();
        assert_eq!(msg.content, "Image");
        assert_eq!(msg.upload.unwrap().policy.folder, "messages/images");
    }

    #[test]
    fn media_without_file_is_rejected() {
        let msg = NewMessage {
            message_type: MessageType::Vocal,
            content: Some("listen".into()),
            attachment: None,
            latitude: None,
            longitude: None,
        };
        let err = msg.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref message, .. } if message == "file required for this type"));
    }

    #[test]
    fn oversized_image_reports_ceiling() {
        let big = vec![0u8; 5 * 1024 * 1024 + 1];
        let err = NewMessage::media(MessageType::Image, Attachment::new(big))
            .validate()
            .unwrap_err();
        match err {
            Error::PayloadTooLarge { max_bytes, .. } => assert_eq!(max_bytes, 5 * 1024 * 1024),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_mime_is_rejected() {
        let err = NewMessage::media(
            MessageType::Image,
            Attachment::new(&b"%PDF"[..]).with_file_name("devis.pdf"),
        )
        .validate()
        .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "file"));
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = NewMessage::text("   ").validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "content"));
    }

    #[test]
    fn location_must_be_complete_and_in_range() {
        let mut msg = NewMessage::text("ici");
        msg.latitude = Some(48.85);
        assert!(msg.clone().validate().is_err());

        let ok = NewMessage::text("ici").with_location(48.85, 2.35).validate().unwrap();
        assert_eq!(
            ok.location,
            Some(Location {
                latitude: 48.85,
                longitude: 2.35
            })
        );

        assert!(NewMessage::text("ici").with_location(91.0, 0.0).validate().is_err());
    }
}
