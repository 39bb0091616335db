use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::error::ServerError;
use crate::model::{ApiResponse, Note, NoteFields, NotesPage};
use crate::store::{Caller, StoredImage};
use crate::Db;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    page: u32,
    #[serde(default = "default_size")]
    size: u32,
}

fn default_size() -> u32 {
    10
}

/// A note form: the `note` JSON part and an optional `image` file part.
struct NoteForm {
    fields: NoteFields,
    image: Option<(String, StoredImage)>,
}

async fn read_form(mut multipart: Multipart) -> Result<NoteForm, ServerError> {
    let bad = |e: axum::extract::multipart::MultipartError| ServerError::BadRequest(e.body_text());
    let mut fields = None;
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "note" => {
                let bytes = field.bytes().await.map_err(bad)?;
                let parsed: NoteFields = serde_json::from_slice(&bytes)
                    .map_err(|e| ServerError::BadRequest(format!("Parte note inválida: {e}")))?;
                fields = Some(parsed);
            }
            "image" => {
                let filename = field.file_name().unwrap_or("imagen").to_string();
                let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
                let data = field.bytes().await.map_err(bad)?.to_vec();
                image = Some((filename, StoredImage { content_type, data }));
            }
            _ => {}
        }
    }
    let fields = fields.ok_or_else(|| ServerError::BadRequest("Falta la parte note".to_string()))?;
    Ok(NoteForm { fields, image })
}

pub async fn list(State(db): State<Db>, Query(q): Query<PageQuery>) -> Json<NotesPage> {
    Json(db.read().await.notes_page(None, q.page, q.size))
}

pub async fn list_mine(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<PageQuery>,
) -> Json<NotesPage> {
    Json(db.read().await.notes_page(Some(caller.user_id), q.page, q.size))
}

pub async fn list_with_images(State(db): State<Db>, Query(q): Query<PageQuery>) -> Json<NotesPage> {
    Json(db.read().await.notes_with_images_page(q.page, q.size))
}

pub async fn get_one(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<Note>, ServerError> {
    Ok(Json(db.read().await.note(id)?))
}

pub async fn create(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Note>>), ServerError> {
    let form = read_form(multipart).await?;
    let note = db.write().await.create_note(&caller, form.fields, form.image)?;
    tracing::info!(note = note.id, user = %caller.username, "note created");
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message(note, "Nota creada"))))
}

pub async fn update(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<Note>>, ServerError> {
    let form = read_form(multipart).await?;
    let note = db.write().await.update_note(&caller, id, form.fields, form.image)?;
    Ok(Json(ApiResponse::with_message(note, "Nota actualizada")))
}

pub async fn remove(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    db.write().await.delete_note(&caller, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn image(
    State(db): State<Db>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let image = db
        .read()
        .await
        .image(&filename)
        .ok_or_else(|| ServerError::NotFound("Imagen no encontrada".to_string()))?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data))
}
