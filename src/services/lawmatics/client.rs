use base64::Engine;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

use super::models::{
    ApiResponse, Company, Contact, Document, PageMeta, Pagination, PracticeArea, Prospect,
    ProspectSearch, SearchOptions, Stage, Task, TaskFilter, TimelineActivity,
    UploadRequest,
};
use crate::errors::ApiError;
use crate::services::cache::TtlCache;
use crate::services::logger::Logger;
use crate::utils::text::encode_uri_component;

type Query<'a> = Vec<(&'a str, String)>;

#[derive(Debug)]
struct Caches {
    prospects: TtlCache<String, Prospect>,
    stages: TtlCache<String, Stage>,
    practice_areas: TtlCache<String, PracticeArea>,
    tasks: TtlCache<String, Task>,
    documents: TtlCache<String, Document>,
    contacts: TtlCache<String, Contact>,
    companies: TtlCache<String, Company>,
}

impl Caches {
    fn new(ttl: Duration) -> Self {
        Self {
            prospects: TtlCache::new(ttl),
            stages: TtlCache::new(ttl),
            practice_areas: TtlCache::new(ttl),
            tasks: TtlCache::new(ttl),
            documents: TtlCache::new(ttl),
            contacts: TtlCache::new(ttl),
            companies: TtlCache::new(ttl),
        }
    }
}

/// Typed wrapper over the Lawmatics REST API with read-through caching.
///
/// Cache locks are never held across an `.await`; concurrent misses for the
/// same id simply fetch twice and the last write wins.
pub struct LawmaticsClient {
    logger: Logger,
    http: Client,
    base_url: String,
    token: String,
    caches: Mutex<Caches>,
}

impl LawmaticsClient {
    pub fn new(
        logger: Logger,
        http: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            logger: logger.child("client"),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            caches: Mutex::new(Caches::new(cache_ttl)),
        }
    }

    fn caches(&self) -> MutexGuard<'_, Caches> {
        self.caches.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url =
            Url::parse(&raw).map_err(|err| ApiError::Io(format!("Invalid URL {}: {}", raw, err)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path, query)?;
        self.logger.debug(
            "Lawmatics request",
            Some(&serde_json::json!({ "method": method.as_str(), "path": path })),
        );
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("content-type", "application/json");
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        let response = request.send().await?;
        ensure_success(response).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, query, body).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: Query<'_>) -> Result<T, ApiError> {
        self.request(Method::GET, path, &query, None).await
    }

    // Prospects (matters)

    /// Bulk listing, served from the cache while it is fresh and non-empty.
    pub async fn get_prospects(
        &self,
        fields: Option<&str>,
    ) -> Result<ApiResponse<Vec<Prospect>>, ApiError> {
        {
            let caches = self.caches();
            if !caches.prospects.is_stale() && !caches.prospects.is_empty() {
                let data = caches.prospects.values();
                let meta = PageMeta {
                    total: Some(data.len() as u64),
                    ..PageMeta::default()
                };
                return Ok(ApiResponse {
                    data,
                    meta: Some(meta),
                    links: None,
                });
            }
        }

        let mut query = Vec::new();
        if let Some(fields) = fields.filter(|f| !f.is_empty()) {
            query.push(("fields", fields.to_string()));
        }
        let response: ApiResponse<Vec<Prospect>> = self.get("/prospects", query).await?;
        self.caches().prospects.set_many(
            response
                .data
                .iter()
                .map(|prospect| (prospect.id.clone(), prospect.clone())),
        );
        Ok(response)
    }

    pub async fn get_prospect(
        &self,
        prospect_id: &str,
        fields: Option<&str>,
    ) -> Result<ApiResponse<Prospect>, ApiError> {
        if let Some(cached) = self.caches().prospects.get(&prospect_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/prospects/{}", encode_uri_component(prospect_id));
        let fields = fields.filter(|f| !f.is_empty()).unwrap_or("all");
        let response: ApiResponse<Prospect> =
            self.get(&path, vec![("fields", fields.to_string())]).await?;
        self.caches()
            .prospects
            .set(prospect_id.to_string(), response.data.clone());
        Ok(response)
    }

    pub async fn create_prospect(&self, attributes: &Value) -> Result<ApiResponse<Prospect>, ApiError> {
        let response: ApiResponse<Prospect> = self
            .request(Method::POST, "/prospects", &[], Some(attributes))
            .await?;
        self.caches()
            .prospects
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    pub async fn update_prospect(
        &self,
        prospect_id: &str,
        attributes: &Value,
    ) -> Result<ApiResponse<Prospect>, ApiError> {
        let path = format!("/prospects/{}", encode_uri_component(prospect_id));
        let response: ApiResponse<Prospect> = self
            .request(Method::PUT, &path, &[], Some(attributes))
            .await?;
        self.caches()
            .prospects
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    /// Evicts the cached entry first; a failed DELETE leaves it evicted.
    pub async fn delete_prospect(&self, prospect_id: &str) -> Result<(), ApiError> {
        self.caches().prospects.remove(&prospect_id.to_string());
        let path = format!("/prospects/{}", encode_uri_component(prospect_id));
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    /// Page-by-page search that never issues more than `max_pages` requests.
    pub async fn search_prospects(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<ProspectSearch, ApiError> {
        let mut prospects = Vec::new();
        let mut current_page = options.page.max(1);
        let mut has_more = true;
        let mut too_many_results = false;
        let mut request_count = 0u32;
        let mut total_pages = 0u64;
        let mut total_entries = 0u64;

        while has_more && current_page <= options.max_pages {
            request_count += 1;
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", "all".to_string()),
                ("page", current_page.to_string()),
            ];
            if let Some(limit) = options.limit {
                params.push(("limit", limit.to_string()));
            }
            let response: ApiResponse<Vec<Prospect>> = self.get("/prospects", params).await?;
            prospects.extend(response.data);

            if let Some(meta) = &response.meta {
                total_pages = meta.total_pages.unwrap_or(0);
                total_entries = meta.total_entries.unwrap_or(0);
            }
            let has_next_link = response
                .links
                .as_ref()
                .and_then(|links| links.next.as_ref())
                .is_some();
            has_more = has_next_link && u64::from(current_page) < total_pages;
            current_page += 1;

            if request_count >= options.max_pages && has_more {
                too_many_results = true;
                break;
            }
        }

        self.logger.debug(
            "Prospect search finished",
            Some(&serde_json::json!({
                "requests": request_count,
                "results": prospects.len(),
                "too_many_results": too_many_results,
            })),
        );
        Ok(ProspectSearch {
            prospects,
            pagination: Pagination {
                current_page: current_page.saturating_sub(1),
                total_pages,
                total_entries,
                has_more,
                too_many_results,
            },
        })
    }

    async fn find_prospect_by(&self, field: &str, value: &str) -> Result<ApiResponse<Prospect>, ApiError> {
        let path = format!("/prospects/find_by_{}/{}", field, encode_uri_component(value));
        let response: ApiResponse<Prospect> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        if !response.data.id.is_empty() {
            self.caches()
                .prospects
                .set(response.data.id.clone(), response.data.clone());
        }
        Ok(response)
    }

    pub async fn find_prospect_by_name(&self, name: &str) -> Result<ApiResponse<Prospect>, ApiError> {
        self.find_prospect_by("name", name).await
    }

    pub async fn find_prospect_by_email(&self, email: &str) -> Result<ApiResponse<Prospect>, ApiError> {
        self.find_prospect_by("email", email).await
    }

    pub async fn find_prospect_by_phone(&self, phone: &str) -> Result<ApiResponse<Prospect>, ApiError> {
        self.find_prospect_by("phone", phone).await
    }

    pub async fn find_prospects_by_case_title(
        &self,
        case_title: &str,
    ) -> Result<ApiResponse<Vec<Prospect>>, ApiError> {
        self.get(
            "/prospects",
            vec![
                ("filter_by", "case_title".to_string()),
                ("filter_on", case_title.to_string()),
                ("filter_with", "ilike".to_string()),
                ("fields", "all".to_string()),
            ],
        )
        .await
    }

    pub async fn get_timeline_activities(
        &self,
        matter_id: &str,
    ) -> Result<ApiResponse<Vec<TimelineActivity>>, ApiError> {
        self.get(
            "/activities",
            vec![
                ("filter_by", "matter_id".to_string()),
                ("filter_on", matter_id.to_string()),
            ],
        )
        .await
    }

    pub async fn get_timeline_activity(
        &self,
        activity_id: &str,
    ) -> Result<ApiResponse<TimelineActivity>, ApiError> {
        let path = format!("/activities/{}", encode_uri_component(activity_id));
        self.get(&path, Vec::new()).await
    }

    // Stages

    pub async fn get_stage(&self, stage_id: &str) -> Result<ApiResponse<Stage>, ApiError> {
        if let Some(cached) = self.caches().stages.get(&stage_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/stages/{}", encode_uri_component(stage_id));
        let response: ApiResponse<Stage> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        self.caches()
            .stages
            .set(stage_id.to_string(), response.data.clone());
        Ok(response)
    }

    pub async fn get_stages(&self) -> Result<ApiResponse<Vec<Stage>>, ApiError> {
        self.get("/stages", vec![("fields", "all".to_string())]).await
    }

    // Practice areas

    pub async fn get_practice_areas(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<Vec<PracticeArea>>, ApiError> {
        let response: ApiResponse<Vec<PracticeArea>> = self
            .get(
                "/practice_areas",
                vec![("page", page.to_string()), ("per_page", per_page.to_string())],
            )
            .await?;
        self.caches().practice_areas.set_many(
            response
                .data
                .iter()
                .map(|area| (area.id.clone(), area.clone())),
        );
        Ok(response)
    }

    pub async fn get_practice_area(
        &self,
        practice_area_id: &str,
    ) -> Result<ApiResponse<PracticeArea>, ApiError> {
        if let Some(cached) = self
            .caches()
            .practice_areas
            .get(&practice_area_id.to_string())
        {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/practice_areas/{}", encode_uri_component(practice_area_id));
        let response: ApiResponse<PracticeArea> = self.get(&path, Vec::new()).await?;
        self.caches()
            .practice_areas
            .set(practice_area_id.to_string(), response.data.clone());
        Ok(response)
    }

    // Tasks

    pub async fn get_tasks(&self, filter: &TaskFilter) -> Result<ApiResponse<Vec<Task>>, ApiError> {
        let mut query = Vec::new();
        let filters = [
            ("matter_id", &filter.matter_id),
            ("prospect_id", &filter.prospect_id),
            ("contact_id", &filter.contact_id),
            ("company_id", &filter.company_id),
            ("client_id", &filter.client_id),
            ("user_id", &filter.user_id),
        ];
        for (key, value) in filters {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                query.push((key, value.clone()));
            }
        }
        if let Some(page) = filter.page {
            query.push(("page", page.to_string()));
        }
        if let Some(limit) = filter.limit {
            query.push(("per_page", limit.to_string()));
        }
        query.push(("fields", "all".to_string()));
        self.get("/tasks", query).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<ApiResponse<Task>, ApiError> {
        if let Some(cached) = self.caches().tasks.get(&task_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/tasks/{}", encode_uri_component(task_id));
        let response: ApiResponse<Task> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        self.caches()
            .tasks
            .set(task_id.to_string(), response.data.clone());
        Ok(response)
    }

    pub async fn create_task(&self, attributes: &Value) -> Result<ApiResponse<Task>, ApiError> {
        let response: ApiResponse<Task> = self
            .request(Method::POST, "/tasks", &[], Some(attributes))
            .await?;
        self.caches()
            .tasks
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        attributes: &Value,
    ) -> Result<ApiResponse<Task>, ApiError> {
        let path = format!("/tasks/{}", encode_uri_component(task_id));
        let response: ApiResponse<Task> = self
            .request(Method::PUT, &path, &[], Some(attributes))
            .await?;
        self.caches()
            .tasks
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), ApiError> {
        self.caches().tasks.remove(&task_id.to_string());
        let path = format!("/tasks/{}", encode_uri_component(task_id));
        self.send(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    // Documents and files

    pub async fn get_documents(
        &self,
        prospect_id: &str,
    ) -> Result<ApiResponse<Vec<Document>>, ApiError> {
        self.get(
            "/documents",
            vec![
                ("filter_by", "matter_id".to_string()),
                ("filter_on", prospect_id.to_string()),
                ("fields", "all".to_string()),
            ],
        )
        .await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<ApiResponse<Document>, ApiError> {
        if let Some(cached) = self.caches().documents.get(&document_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/documents/{}", encode_uri_component(document_id));
        let response: ApiResponse<Document> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        self.caches()
            .documents
            .set(document_id.to_string(), response.data.clone());
        Ok(response)
    }

    /// Raw file content, base64 encoded.
    pub async fn download_document(&self, document_id: &str) -> Result<String, ApiError> {
        let path = format!("/files/download/{}", encode_uri_component(document_id));
        let response = self.send(Method::GET, &path, &[], None).await?;
        let bytes = response.bytes().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
    }

    /// Multipart upload; `file` is always the last part.
    pub async fn upload_file(&self, upload: UploadRequest) -> Result<Value, ApiError> {
        let url = self.url("/files", &[])?;
        let mut form = reqwest::multipart::Form::new()
            .text("documentable_type", upload.documentable_type.as_str());
        if let Some(id) = upload.documentable_id {
            form = form.text("documentable_id", id);
        }
        if let Some(name) = upload.name {
            form = form.text("name", name);
        }
        if let Some(folder_id) = upload.folder_id {
            form = form.text("folder_id", folder_id);
        }
        if let Some(path) = upload.path {
            let encoded =
                serde_json::to_string(&path).map_err(|err| ApiError::Io(err.to_string()))?;
            form = form.text("path", encoded);
        }
        let part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        form = form.part("file", part);

        self.logger.info(
            "Uploading file",
            Some(&serde_json::json!({ "documentable_type": upload.documentable_type.as_str() })),
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
    }

    // Contacts and companies

    pub async fn get_contact(&self, contact_id: &str) -> Result<ApiResponse<Contact>, ApiError> {
        if let Some(cached) = self.caches().contacts.get(&contact_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/contacts/{}", encode_uri_component(contact_id));
        let response: ApiResponse<Contact> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        self.caches()
            .contacts
            .set(contact_id.to_string(), response.data.clone());
        Ok(response)
    }

    pub async fn find_contact_by_email(&self, email: &str) -> Result<ApiResponse<Contact>, ApiError> {
        let path = format!("/contacts/find_by_email/{}", encode_uri_component(email));
        let response: ApiResponse<Contact> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        if !response.data.id.is_empty() {
            self.caches()
                .contacts
                .set(response.data.id.clone(), response.data.clone());
        }
        Ok(response)
    }

    pub async fn create_contact(&self, attributes: &Value) -> Result<ApiResponse<Contact>, ApiError> {
        let response: ApiResponse<Contact> = self
            .request(Method::POST, "/contacts", &[], Some(attributes))
            .await?;
        self.caches()
            .contacts
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    pub async fn get_company(&self, company_id: &str) -> Result<ApiResponse<Company>, ApiError> {
        if let Some(cached) = self.caches().companies.get(&company_id.to_string()) {
            return Ok(ApiResponse::new(cached));
        }
        let path = format!("/companies/{}", encode_uri_component(company_id));
        let response: ApiResponse<Company> =
            self.get(&path, vec![("fields", "all".to_string())]).await?;
        self.caches()
            .companies
            .set(company_id.to_string(), response.data.clone());
        Ok(response)
    }

    pub async fn create_company(&self, attributes: &Value) -> Result<ApiResponse<Company>, ApiError> {
        let response: ApiResponse<Company> = self
            .request(Method::POST, "/companies", &[], Some(attributes))
            .await?;
        self.caches()
            .companies
            .set(response.data.id.clone(), response.data.clone());
        Ok(response)
    }

    /// Whether the bulk prospect listing would be refetched on the next call.
    pub fn prospect_cache_is_stale(&self) -> bool {
        self.caches().prospects.is_stale()
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}
