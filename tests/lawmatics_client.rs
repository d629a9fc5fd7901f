mod common;
use common::{MockReply, MockUpstream, RecordedRequest};

use lawmatics_mcp::app::App;
use lawmatics_mcp::config::{Settings, Toolset};
use lawmatics_mcp::mcp::catalog::EndpointCatalog;
use lawmatics_mcp::services::credentials::StaticCredentials;
use lawmatics_mcp::services::lawmatics::models::SearchOptions;
use lawmatics_mcp::services::lawmatics::LawmaticsClient;
use lawmatics_mcp::services::logger::Logger;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(upstream: &MockUpstream, ttl: Duration) -> LawmaticsClient {
    LawmaticsClient::new(
        Logger::new("test"),
        reqwest::Client::new(),
        format!("{}/v1", upstream.base_url),
        "primary-token",
        ttl,
    )
}

fn resource_app(upstream: &MockUpstream) -> App {
    let settings = Settings {
        api_token: Some("primary-token".to_string()),
        api_base_url: format!("{}/v1", upstream.base_url),
        toolset: Toolset::Resources,
        ..Settings::default()
    };
    App::build(
        settings,
        Arc::new(StaticCredentials::new()),
        &EndpointCatalog::default(),
    )
    .expect("app")
}

fn paged_prospects(total_pages: u64) -> impl Fn(&RecordedRequest) -> MockReply {
    move |req| {
        let page: u64 = req
            .query_value("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        let next = if page < total_pages {
            json!(format!("/v1/prospects?page={}", page + 1))
        } else {
            serde_json::Value::Null
        };
        MockReply::json(
            200,
            json!({
                "data": [ { "id": format!("p{}", page), "type": "prospect", "attributes": { "first_name": "P", "last_name": page.to_string() } } ],
                "meta": { "total_pages": total_pages, "total_entries": total_pages },
                "links": { "next": next }
            }),
        )
    }
}

#[tokio::test]
async fn get_prospect_is_served_from_cache_on_second_call() {
    let upstream = MockUpstream::start(|req| {
        if req.path == "/v1/prospects/123" {
            MockReply::json(200, json!({ "data": { "id": "123", "type": "prospect", "attributes": { "first_name": "Jane" } } }))
        } else {
            MockReply::json(404, json!({ "error": "not found" }))
        }
    })
    .await;
    let app = resource_app(&upstream);

    let first = app
        .executor
        .execute("get_prospect", json!({ "prospectId": "123" }))
        .await;
    let second = app
        .executor
        .execute("get_prospect", json!({ "prospectId": "123" }))
        .await;

    assert!(!first.is_error, "{}", first.joined_text());
    assert!(first.joined_text().contains("Jane"));
    assert!(second.joined_text().contains("Jane"));
    assert_eq!(upstream.hits("/v1/prospects/123"), 1);

    let req = &upstream.requests()[0];
    assert_eq!(req.header("authorization"), Some("Bearer primary-token"));
    assert_eq!(req.query_value("fields"), Some("all"));
}

#[tokio::test]
async fn stage_name_is_resolved_and_failure_falls_back_to_id() {
    let upstream = MockUpstream::start(|req| match req.path.as_str() {
        "/v1/prospects/1" => MockReply::json(200, json!({ "data": {
            "id": "1", "type": "prospect",
            "attributes": { "first_name": "Ada" },
            "relationships": { "stage": { "data": { "id": "s1", "type": "stage" } } }
        } })),
        "/v1/prospects/2" => MockReply::json(200, json!({ "data": {
            "id": "2", "type": "prospect",
            "attributes": { "first_name": "Bob" },
            "relationships": { "stage": { "data": { "id": "s404", "type": "stage" } } }
        } })),
        "/v1/stages/s1" => MockReply::json(200, json!({ "data": { "id": "s1", "attributes": { "name": "Consult", "color": "123456" } } })),
        _ => MockReply::json(404, json!({})),
    })
    .await;
    let app = resource_app(&upstream);

    let named = app
        .executor
        .execute("get_prospect", json!({ "prospectId": "1" }))
        .await;
    assert!(named.joined_text().contains("Stage: Consult (#123456)"));

    let fallback = app
        .executor
        .execute("get_prospect", json!({ "prospectId": "2" }))
        .await;
    assert!(!fallback.is_error);
    assert!(fallback
        .joined_text()
        .contains("Stage ID: s404 (details not available)"));
}

#[tokio::test]
async fn single_entity_write_unstales_the_bulk_listing() {
    let upstream = MockUpstream::start(|req| match req.path.as_str() {
        "/v1/prospects" => MockReply::json(200, json!({ "data": [ { "id": "1" }, { "id": "2" } ] })),
        _ => MockReply::json(200, json!({ "data": { "id": "99" } })),
    })
    .await;
    let client = client(&upstream, Duration::from_millis(50));

    let listed = client.get_prospects(Some("all")).await.unwrap();
    assert_eq!(listed.data.len(), 2);
    client.get_prospects(Some("all")).await.unwrap();
    assert_eq!(upstream.hits("/v1/prospects"), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(client.prospect_cache_is_stale());

    // Caching one unrelated prospect resets the shared freshness clock,
    // so the stale bulk listing is served again without a refetch.
    client.get_prospect("99", None).await.unwrap();
    assert!(!client.prospect_cache_is_stale());
    let listed = client.get_prospects(Some("all")).await.unwrap();
    assert_eq!(upstream.hits("/v1/prospects"), 1);
    assert_eq!(listed.data.len(), 3);
}

#[tokio::test]
async fn search_stops_at_max_pages_and_flags_remaining_results() {
    let upstream = MockUpstream::start(paged_prospects(10)).await;
    let client = client(&upstream, Duration::from_secs(60));

    let result = client
        .search_prospects(
            "smith",
            SearchOptions {
                max_pages: 3,
                ..SearchOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(upstream.hits("/v1/prospects"), 3);
    assert_eq!(result.prospects.len(), 3);
    assert!(result.pagination.too_many_results);
    assert!(result.pagination.has_more);
    assert_eq!(result.pagination.current_page, 3);
    assert_eq!(result.pagination.total_pages, 10);
    let first = &upstream.requests()[0];
    assert_eq!(first.query_value("q"), Some("smith"));
    assert_eq!(first.query_value("page"), Some("1"));
}

#[tokio::test]
async fn search_ends_when_the_server_runs_out_of_pages() {
    let upstream = MockUpstream::start(paged_prospects(2)).await;
    let client = client(&upstream, Duration::from_secs(60));

    let result = client
        .search_prospects("smith", SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(upstream.hits("/v1/prospects"), 2);
    assert!(!result.pagination.too_many_results);
    assert!(!result.pagination.has_more);
    assert_eq!(result.pagination.total_entries, 2);
}

#[tokio::test]
async fn search_tool_reports_too_many_results() {
    let upstream = MockUpstream::start(paged_prospects(10)).await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("search_prospects", json!({ "query": "smith", "maxPages": 2 }))
        .await;

    let text = result.joined_text();
    assert!(!result.is_error, "{}", text);
    assert!(text.starts_with("Result (2 matters / prospects found matching \"smith\""));
    assert!(text.contains("- p1: P 1 (No email)"));
    assert!(text.contains("Note: Too many results."));
    assert_eq!(upstream.hits("/v1/prospects"), 2);
}

#[tokio::test]
async fn delete_evicts_before_the_request_even_when_it_fails() {
    let upstream = MockUpstream::start(|req| match req.method.as_str() {
        "DELETE" => MockReply::json(500, json!({ "error": "boom" })),
        _ => MockReply::json(200, json!({ "data": { "id": "5", "attributes": { "first_name": "Eve" } } })),
    })
    .await;
    let client = client(&upstream, Duration::from_secs(60));

    client.get_prospect("5", None).await.unwrap();
    let err = client.delete_prospect("5").await.unwrap_err();
    assert_eq!(err.status(), Some(500));

    client.get_prospect("5", None).await.unwrap();
    assert_eq!(upstream.hits("/v1/prospects/5"), 3);
}

#[tokio::test]
async fn upstream_failure_surfaces_as_error_result() {
    let upstream = MockUpstream::start(|_| MockReply::json(401, json!({ "error": "bad token" }))).await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("get_task", json!({ "taskId": "t1" }))
        .await;

    assert!(result.is_error);
    assert!(result.joined_text().contains("401"), "{}", result.joined_text());
}

#[tokio::test]
async fn find_by_name_reports_a_miss_as_text() {
    let upstream = MockUpstream::start(|_| MockReply::json(404, json!({ "error": "not found" }))).await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("find_prospect_by_name", json!({ "name": "Nobody Here" }))
        .await;

    assert!(!result.is_error);
    assert_eq!(
        result.joined_text(),
        "No matter / prospect found matching the name: \"Nobody Here\"."
    );
    assert_eq!(upstream.requests()[0].path, "/v1/prospects/find_by_name/Nobody%20Here");
}

#[tokio::test]
async fn list_tasks_sends_filters_and_page_size() {
    let upstream = MockUpstream::start(|_| {
        MockReply::json(200, json!({
            "data": [ { "id": "t1", "attributes": { "name": "Call", "done": false } } ],
            "meta": { "total_entries": 40, "total_pages": 2 }
        }))
    })
    .await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("list_tasks", json!({ "matter_id": "m1", "limit": 20 }))
        .await;

    let text = result.joined_text();
    assert!(text.starts_with("Tasks (Page 1 of 2, Showing 1 of 40 total)"), "{}", text);
    assert!(text.contains("Use the 'page' parameter"));
    let req = &upstream.requests()[0];
    assert_eq!(req.path, "/v1/tasks");
    assert_eq!(req.query_value("matter_id"), Some("m1"));
    assert_eq!(req.query_value("per_page"), Some("20"));
    assert_eq!(req.query_value("page"), Some("1"));
}

#[tokio::test]
async fn upload_sends_multipart_with_file_last() {
    let upstream = MockUpstream::start(|_| {
        MockReply::json(200, json!({ "data": { "id": "f1", "attributes": { "file_url": "https://files.test/f1" } } }))
    })
    .await;
    let app = resource_app(&upstream);
    let path = std::env::temp_dir().join(format!("{}-memo.txt", uuid::Uuid::new_v4()));
    std::fs::write(&path, "memo body").unwrap();

    let result = app
        .executor
        .execute(
            "upload_file",
            json!({ "filePath": path, "documentableType": "matter", "documentableId": "m9" }),
        )
        .await;
    let _ = std::fs::remove_file(&path);

    let text = result.joined_text();
    assert!(!result.is_error, "{}", text);
    assert!(text.contains("File URL: https://files.test/f1"));
    let req = &upstream.requests()[0];
    assert_eq!(req.path, "/v1/files");
    assert!(req
        .header("content-type")
        .unwrap_or_default()
        .starts_with("multipart/form-data"));
    let type_at = req.body.find("name=\"documentable_type\"").unwrap();
    let id_at = req.body.find("name=\"documentable_id\"").unwrap();
    let file_at = req.body.find("name=\"file\"").unwrap();
    assert!(type_at < id_at && id_at < file_at);
    assert!(req.body.contains("memo body"));
}

#[tokio::test]
async fn created_prospect_is_cached_under_the_server_assigned_id() {
    let upstream = MockUpstream::start(|req| match req.method.as_str() {
        "POST" => MockReply::json(201, json!({ "data": { "id": "99", "type": "prospect", "attributes": { "first_name": "Nia", "last_name": "Cole" } } })),
        _ => MockReply::json(404, json!({ "error": "not found" })),
    })
    .await;
    let app = resource_app(&upstream);

    let created = app
        .executor
        .execute(
            "create_prospect",
            json!({ "firstName": "Nia", "lastName": "Cole", "email": "nia@x.test" }),
        )
        .await;
    assert!(!created.is_error, "{}", created.joined_text());
    assert!(created.joined_text().contains("99"));

    let fetched = app
        .executor
        .execute("get_prospect", json!({ "prospectId": "99" }))
        .await;
    assert!(fetched.joined_text().contains("Nia"), "{}", fetched.joined_text());
    assert_eq!(upstream.total_hits(), 1);

    let req = &upstream.requests()[0];
    assert_eq!(req.path, "/v1/prospects");
    let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body["first_name"], "Nia");
    assert_eq!(body["email"], "nia@x.test");
}

#[tokio::test]
async fn update_always_hits_the_network_and_refreshes_the_cache() {
    let upstream = MockUpstream::start(|req| match req.method.as_str() {
        "PUT" => MockReply::json(200, json!({ "data": { "id": "7", "attributes": { "first_name": "New" } } })),
        _ => MockReply::json(200, json!({ "data": { "id": "7", "attributes": { "first_name": "Old" } } })),
    })
    .await;
    let client = client(&upstream, Duration::from_secs(60));

    client.get_prospect("7", None).await.unwrap();
    client
        .update_prospect("7", &json!({ "first_name": "New" }))
        .await
        .unwrap();
    let cached = client.get_prospect("7", None).await.unwrap();

    assert_eq!(cached.data.attr_text("first_name").as_deref(), Some("New"));
    let methods: Vec<String> = upstream.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec!["GET", "PUT"]);
}

#[tokio::test]
async fn task_update_is_cached_and_delete_evicts() {
    let upstream = MockUpstream::start(|req| match req.method.as_str() {
        "PUT" => MockReply::json(200, json!({ "data": { "id": "t1", "attributes": { "name": "Call back", "done": true } } })),
        "DELETE" => MockReply::text(204, ""),
        _ => MockReply::json(200, json!({ "data": { "id": "t1", "attributes": { "name": "Call back", "done": true } } })),
    })
    .await;
    let app = resource_app(&upstream);

    let updated = app
        .executor
        .execute("update_task", json!({ "taskId": "t1", "done": true }))
        .await;
    assert!(!updated.is_error, "{}", updated.joined_text());
    assert!(updated.joined_text().starts_with("Task t1 updated."));
    app.executor
        .execute("get_task", json!({ "taskId": "t1" }))
        .await;
    assert_eq!(upstream.total_hits(), 1);
    let put = &upstream.requests()[0];
    assert_eq!(put.path, "/v1/tasks/t1");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&put.body).unwrap(),
        json!({ "done": true })
    );

    let deleted = app
        .executor
        .execute("delete_task", json!({ "taskId": "t1" }))
        .await;
    assert_eq!(deleted.joined_text(), "Task t1 deleted.");
    app.executor
        .execute("get_task", json!({ "taskId": "t1" }))
        .await;
    let methods: Vec<String> = upstream.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec!["PUT", "DELETE", "GET"]);
}

#[tokio::test]
async fn update_task_without_fields_is_rejected_locally() {
    let upstream = MockUpstream::start(|_| MockReply::json(200, json!({}))).await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("update_task", json!({ "taskId": "t1" }))
        .await;

    assert!(result.is_error);
    assert!(result.joined_text().contains("at least one field"));
    assert_eq!(upstream.total_hits(), 0);
}

#[tokio::test]
async fn created_contact_and_company_are_served_from_cache() {
    let upstream = MockUpstream::start(|req| match req.path.as_str() {
        "/v1/contacts" => MockReply::json(201, json!({ "data": { "id": "c5", "attributes": { "first_name": "Ann", "last_name": "Lee" } } })),
        "/v1/companies" => MockReply::json(201, json!({ "data": { "id": "co2", "attributes": { "name": "Acme" } } })),
        _ => MockReply::json(404, json!({})),
    })
    .await;
    let app = resource_app(&upstream);

    let contact = app
        .executor
        .execute("create_contact", json!({ "firstName": "Ann", "lastName": "Lee" }))
        .await;
    assert!(contact.joined_text().starts_with("Contact created with ID: c5."), "{}", contact.joined_text());
    let company = app
        .executor
        .execute("create_company", json!({ "name": "Acme" }))
        .await;
    assert!(company.joined_text().starts_with("Company created with ID: co2."), "{}", company.joined_text());

    let got_contact = app
        .executor
        .execute("get_contact", json!({ "contactId": "c5" }))
        .await;
    let got_company = app
        .executor
        .execute("get_company", json!({ "companyId": "co2" }))
        .await;
    assert!(got_contact.joined_text().contains("Name: Ann Lee"));
    assert!(got_company.joined_text().contains("Name: Acme"));

    let methods: Vec<String> = upstream.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec!["POST", "POST"]);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&upstream.requests()[0].body).unwrap(),
        json!({ "first_name": "Ann", "last_name": "Lee" })
    );
}

#[tokio::test]
async fn single_timeline_activity_is_fetched_by_id() {
    let upstream = MockUpstream::start(|_| {
        MockReply::json(200, json!({ "data": {
            "id": "a1", "type": "activity",
            "attributes": { "name": "Email sent", "description": "Intake form", "created_at": "2024-05-02T08:30:00Z" },
            "relationships": { "matter": { "data": { "id": "m3", "type": "prospect" } } }
        } }))
    })
    .await;
    let app = resource_app(&upstream);

    let result = app
        .executor
        .execute("get_timeline_activity", json!({ "activityId": "a1" }))
        .await;

    assert_eq!(
        result.joined_text(),
        "- [2024-05-02 08:30:00 UTC] Email sent: Intake form (ID: a1)\nMatter / prospect: m3"
    );
    let req = &upstream.requests()[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/v1/activities/a1");
}

#[tokio::test]
async fn rejected_upload_reports_status_and_body() {
    let upstream = MockUpstream::start(|_| MockReply::text(413, "file exceeds 25MB limit")).await;
    let app = resource_app(&upstream);
    let path = std::env::temp_dir().join(format!("{}-big.pdf", uuid::Uuid::new_v4()));
    std::fs::write(&path, "pdf bytes").unwrap();

    let result = app
        .executor
        .execute("upload_file", json!({ "filePath": path, "documentableType": "firm" }))
        .await;
    let _ = std::fs::remove_file(&path);

    assert!(result.is_error);
    let text = result.joined_text();
    assert!(text.contains("Failed to upload file"), "{}", text);
    assert!(text.contains("413"), "{}", text);
    assert!(text.contains("file exceeds 25MB limit"), "{}", text);
    assert_eq!(upstream.total_hits(), 1);
}
