//! Blog notes: paginated listings, multipart create/update, image download.
//!
//! Failures are reported as `NotesError` with a Spanish message ready to
//! show. A 401 on an authenticated call ends the session held by the
//! `AuthService`.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthService};
use crate::client::{check_status, parse_response};
use crate::error::ApiError;
use crate::http::{FormPart, HttpBody, HttpMethod, HttpResponse};
use crate::query::QueryParams;
use crate::types::{ApiResponse, ImageUpload, Note, NoteInput, NotesPage, Pagination};

pub const NOTES_PATH: &str = "/api/notes";
pub const MY_NOTES_PATH: &str = "/api/notes/my";
pub const NOTES_WITH_IMAGES_PATH: &str = "/api/notes/with-images";
pub const IMAGE_PATH: &str = "/api/notes/image/";

pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;
const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];
const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Number of cards on the public homepage feed.
pub const HOMEPAGE_ARTICLES: u32 = 6;
const ARTICLE_SUBTITLE: &str = "Actualidad médica";
const ARTICLE_AUTHOR: &str = "Equipo médico";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NotesError {
    pub message: String,
    pub status: Option<u16>,
}

impl NotesError {
    fn invalid(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status: None,
        }
    }
}

impl From<AuthError> for NotesError {
    fn from(error: AuthError) -> Self {
        Self {
            message: error.message,
            status: error.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    ListMine,
    ListFeatured,
    Get,
    Create,
    Update,
    Delete,
    LoadImage,
}

impl Operation {
    fn action(self) -> &'static str {
        match self {
            Operation::List => "obtener las notas",
            Operation::ListMine => "obtener tus notas",
            Operation::ListFeatured => "obtener las notas destacadas",
            Operation::Get => "obtener la nota",
            Operation::Create => "crear la nota",
            Operation::Update => "actualizar la nota",
            Operation::Delete => "eliminar la nota",
            Operation::LoadImage => "cargar la imagen",
        }
    }
}

/// JSON carried in the `note` multipart part.
#[derive(Debug, Serialize)]
struct NotePayload<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    description: &'a str,
}

/// Write endpoints wrap the note in the standard envelope; reads return it
/// bare. Both are accepted everywhere.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Wrapped(ApiResponse<T>),
    Bare(T),
}

impl<T> MaybeEnveloped<T> {
    fn into_inner(self) -> T {
        match self {
            MaybeEnveloped::Wrapped(res) => res.data,
            MaybeEnveloped::Bare(value) => value,
        }
    }
}

/// A note as shown on the public homepage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCard {
    /// Absolute image URL.
    pub image_src: String,
    pub image_alt: String,
    pub title: String,
    pub subtitle: String,
    pub text: String,
    pub author: String,
}

impl ArticleCard {
    /// Card for a note; image references resolve against `origin`. Notes
    /// without an image yield `None`.
    pub fn from_note(note: &Note, origin: &str) -> Option<Self> {
        let image = note.image_reference()?;
        let subtitle = match note.subtitle.trim() {
            "" => ARTICLE_SUBTITLE,
            subtitle => subtitle,
        };
        Some(Self {
            image_src: image_url(origin, image),
            image_alt: note.title.clone(),
            title: note.title.clone(),
            subtitle: subtitle.to_string(),
            text: note.description.clone(),
            author: note
                .username
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| ARTICLE_AUTHOR.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NotesService {
    auth: AuthService,
}

impl NotesService {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }

    pub async fn get_all_notes(&self, pagination: Pagination) -> Result<NotesPage, NotesError> {
        self.list(NOTES_PATH, pagination, Operation::List).await
    }

    pub async fn get_my_notes(&self, pagination: Pagination) -> Result<NotesPage, NotesError> {
        self.list(MY_NOTES_PATH, pagination, Operation::ListMine).await
    }

    /// Only notes that carry an image, newest first.
    pub async fn get_notes_with_images(
        &self,
        pagination: Pagination,
    ) -> Result<NotesPage, NotesError> {
        self.list(NOTES_WITH_IMAGES_PATH, pagination, Operation::ListFeatured)
            .await
    }

    /// The first page of illustrated notes as homepage cards.
    pub async fn homepage_articles(&self) -> Result<Vec<ArticleCard>, NotesError> {
        let page = self
            .get_notes_with_images(Pagination {
                page: 0,
                size: HOMEPAGE_ARTICLES,
            })
            .await?;
        let origin = self.auth.authenticated_client().base_url().to_string();
        Ok(page
            .content
            .iter()
            .filter_map(|note| ArticleCard::from_note(note, &origin))
            .take(HOMEPAGE_ARTICLES as usize)
            .collect())
    }

    async fn list(
        &self,
        path: &str,
        pagination: Pagination,
        op: Operation,
    ) -> Result<NotesPage, NotesError> {
        let params = QueryParams::new()
            .insert("page", pagination.page)
            .insert("size", pagination.size);
        self.call(HttpMethod::Get, path, None, Some(&params), op).await
    }

    pub async fn get_note_by_id(&self, id: i64) -> Result<Note, NotesError> {
        let path = format!("{NOTES_PATH}/{id}");
        self.call(HttpMethod::Get, &path, None, None, Operation::Get)
            .await
            .map_err(|e| match e.status {
                Some(404) => NotesError {
                    message: "Nota no encontrada".to_string(),
                    status: Some(404),
                },
                _ => e,
            })
    }

    pub async fn create_note(&self, input: &NoteInput) -> Result<Note, NotesError> {
        validate_note(input)?;
        let body = multipart_body(input)?;
        self.call(HttpMethod::Post, NOTES_PATH, Some(body), None, Operation::Create)
            .await
    }

    pub async fn update_note(&self, id: i64, input: &NoteInput) -> Result<Note, NotesError> {
        validate_note(input)?;
        let body = multipart_body(input)?;
        let path = format!("{NOTES_PATH}/{id}");
        self.call(HttpMethod::Put, &path, Some(body), None, Operation::Update)
            .await
    }

    pub async fn delete_note(&self, id: i64) -> Result<(), NotesError> {
        let path = format!("{NOTES_PATH}/{id}");
        self.send(HttpMethod::Delete, &path, None, None, Operation::Delete)
            .await
            .map(|_| ())
    }

    /// Raw image bytes. Image downloads are public and carry no token.
    pub async fn get_image(&self, filename: &str) -> Result<Vec<u8>, NotesError> {
        Ok(self.fetch_image(filename).await?.body)
    }

    /// The image as a `data:` URL, typed from the response's content type.
    pub async fn get_image_data_url(&self, filename: &str) -> Result<String, NotesError> {
        let response = self.fetch_image(filename).await?;
        let content_type = response
            .header("content-type")
            .unwrap_or("application/octet-stream");
        let encoded = base64::engine::general_purpose::STANDARD.encode(&response.body);
        Ok(format!("data:{content_type};base64,{encoded}"))
    }

    /// Absolute URL for a note image reference, against this service's API.
    pub fn image_url(&self, reference: &str) -> String {
        image_url(self.auth.authenticated_client().base_url(), reference)
    }

    async fn fetch_image(&self, filename: &str) -> Result<HttpResponse, NotesError> {
        let client = self.auth.authenticated_client().without_token();
        let request = client.build_request(
            HttpMethod::Get,
            &format!("{IMAGE_PATH}{filename}"),
            None,
            None,
            &[],
        );
        let op = Operation::LoadImage;
        let response = client.send(request).await.map_err(|e| connection_error(op, &e))?;
        if !response.is_success() {
            tracing::warn!(filename, status = response.status, "image download failed");
            return Err(NotesError {
                message: format!("Error al {}", op.action()),
                status: Some(response.status),
            });
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<HttpBody>,
        params: Option<&QueryParams>,
        op: Operation,
    ) -> Result<T, NotesError> {
        let response = self.send(method, path, body, params, op).await?;
        parse_response::<MaybeEnveloped<T>>(&response)
            .map(MaybeEnveloped::into_inner)
            .map_err(|e| connection_error(op, &e))
    }

    /// Execute an authenticated request and map non-2xx statuses.
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<HttpBody>,
        params: Option<&QueryParams>,
        op: Operation,
    ) -> Result<HttpResponse, NotesError> {
        let client = self.auth.authenticated_client();
        let request = client.build_request(method, path, body, params, &[]);
        let response = client.send(request).await.map_err(|e| connection_error(op, &e))?;
        match check_status(&response) {
            Ok(()) => Ok(response),
            Err(e) if e.is_unauthorized() => Err(self.auth.expire_session().into()),
            Err(e) => Err(NotesError {
                message: e
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Error al {}", op.action())),
                status: e.status(),
            }),
        }
    }
}

fn connection_error(op: Operation, error: &ApiError) -> NotesError {
    tracing::warn!(error = %error, "notes request failed: {}", op.action());
    NotesError::invalid(&format!("Error de conexión al {}", op.action()))
}

fn multipart_body(input: &NoteInput) -> Result<HttpBody, NotesError> {
    let payload = NotePayload {
        title: &input.title,
        subtitle: input.subtitle.as_deref(),
        category: input.category.as_deref(),
        description: &input.description,
    };
    let json = serde_json::to_string(&payload)
        .map_err(|e| NotesError::invalid(&format!("Error al preparar la nota: {e}")))?;
    let mut parts = vec![FormPart::json("note", json)];
    if let Some(image) = &input.image {
        parts.push(FormPart::file(
            "image",
            &image.filename,
            &image.content_type,
            image.data.clone(),
        ));
    }
    Ok(HttpBody::Multipart(parts))
}

/// Check the form fields and the attached image before upload.
pub fn validate_note(input: &NoteInput) -> Result<(), NotesError> {
    let title = input.title.chars().count();
    if title == 0 {
        return Err(NotesError::invalid("El título es requerido"));
    }
    if title > MAX_TITLE_CHARS {
        return Err(NotesError::invalid("El título no puede superar los 200 caracteres"));
    }
    let description = input.description.chars().count();
    if description == 0 {
        return Err(NotesError::invalid("La descripción es requerida"));
    }
    if description > MAX_DESCRIPTION_CHARS {
        return Err(NotesError::invalid(
            "La descripción no puede superar los 2000 caracteres",
        ));
    }
    match &input.image {
        Some(image) => validate_image(image),
        None => Ok(()),
    }
}

/// JPEG or PNG, at most 50 MB.
pub fn validate_image(image: &ImageUpload) -> Result<(), NotesError> {
    if !ALLOWED_IMAGE_TYPES.contains(&image.content_type.as_str()) {
        return Err(NotesError::invalid("Solo se permiten archivos JPG y PNG"));
    }
    if image.data.len() > MAX_IMAGE_BYTES {
        return Err(NotesError::invalid("El archivo no puede superar los 50MB"));
    }
    Ok(())
}

/// Resolve an image reference to an absolute URL under `origin`.
///
/// Absolute URLs are returned unchanged, `/api/...` paths are joined to the
/// origin and anything else is treated as a filename in the image store.
/// Applying it to its own output returns the same URL.
pub fn image_url(origin: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    let origin = origin.trim_end_matches('/');
    if reference.starts_with("/api/") {
        return format!("{origin}{reference}");
    }
    format!("{origin}{IMAGE_PATH}{}", reference.trim_start_matches('/'))
}

/// Last path segment of an image URL.
pub fn extract_filename(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

impl Note {
    /// The image reference to resolve, preferring `imageUrl`.
    pub fn image_reference(&self) -> Option<&str> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }
        non_empty(&self.image_url).or_else(|| non_empty(&self.image_filename))
    }
}
