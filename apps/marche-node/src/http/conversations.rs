//! Conversation and message endpoints

use super::error::ApiError;
use super::extract::{AuthenticatedUser, Caller};
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use marche_store::{
    Attachment, Conversation, ConversationDetail, ConversationSummary, MessageType, MessageView,
    NewMessage,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct StartConversation {
    pub counterpart_id: Option<i64>,
}

/// Text fields of a send request, shared by the JSON and multipart forms
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageBody {
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub content: Option<String>,
    /// Inline file as a base64 data URI
    pub file_data: Option<String>,
    pub file_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SendMessageBody {
    fn into_new_message(self, file: Option<Attachment>) -> Result<NewMessage, ApiError> {
        let message_type = match self.message_type.as_deref().map(str::trim) {
            None | Some("") => MessageType::Text,
            Some(name) => name
                .parse::<MessageType>()
                .map_err(|e| ApiError::validation("type", e.to_string()))?,
        };

        let attachment = match (file, self.file_data) {
            (Some(_), Some(_)) => {
                return Err(ApiError::validation(
                    "file",
                    "send either a file part or file_data, not both",
                ))
            }
            (Some(file), None) => Some(file),
            (None, Some(data)) => Some(Attachment::from_data_uri(&data)?),
            (None, None) => None,
        };
        let attachment = attachment.map(|a| match self.file_name {
            Some(name) if !name.trim().is_empty() => a.with_file_name(name),
            _ => a,
        });

        Ok(NewMessage {
            message_type,
            content: self.content,
            attachment,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

pub async fn list_conversations(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let inbox = state.service.list_conversations_for(user_id).await?;
    Ok(Json(inbox))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Caller(caller): Caller,
) -> Result<Json<ConversationDetail>, ApiError> {
    let Path(conversation_id) = path.map_err(|e| ApiError::path_rejected("id", e))?;
    let detail = state.service.get_conversation(conversation_id, caller).await?;
    Ok(Json(detail))
}

pub async fn start_conversation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<StartConversation>, JsonRejection>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let Json(payload) = payload?;
    let (conversation, created) = state
        .service
        .start_conversation(caller, payload.counterpart_id)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)))
}

pub async fn send_message(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Caller(caller): Caller,
    request: Request,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let Path(conversation_id) = path.map_err(|e| ApiError::path_rejected("id", e))?;
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let payload = if is_multipart {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            ApiError::validation("body", e.to_string())
        })?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<SendMessageBody>::from_request(request, &state).await?;
        body.into_new_message(None)?
    };

    debug!(
        "Send {} to conversation {} from {:?}",
        payload.message_type, conversation_id, caller
    );
    let message = state.service.send(conversation_id, caller, payload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn read_multipart(mut multipart: Multipart) -> Result<NewMessage, ApiError> {
    let mut body = SendMessageBody::default();
    let mut file: Option<Attachment> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                let mut attachment = Attachment::new(bytes);
                if let Some(file_name) = file_name {
                    attachment = attachment.with_file_name(file_name);
                }
                if let Some(mime) = mime {
                    attachment = attachment.with_mime(mime);
                }
                file = Some(attachment);
            }
            "type" => body.message_type = Some(field.text().await?),
            "content" => body.content = Some(field.text().await?),
            "file_data" => {
                let data = field.text().await?;
                body.file_data = (!data.trim().is_empty()).then_some(data);
            }
            "file_name" => body.file_name = Some(field.text().await?),
            "latitude" => body.latitude = parse_coordinate("latitude", &field.text().await?)?,
            "longitude" => body.longitude = parse_coordinate("longitude", &field.text().await?)?,
            _ => debug!("Ignoring multipart field {}", name),
        }
    }

    body.into_new_message(file)
}

fn parse_coordinate(field: &str, value: &str) -> Result<Option<f64>, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ApiError::validation(field, "must be a number"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Caller(caller): Caller,
) -> Result<Json<Value>, ApiError> {
    let Path(conversation_id) = path.map_err(|e| ApiError::path_rejected("id", e))?;
    let count = state.service.mark_as_read(conversation_id, caller).await?;
    Ok(Json(json!({ "count": count })))
}
