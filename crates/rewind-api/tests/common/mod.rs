//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use rewind_api::{build_router, AppState};
use rewind_core::RetentionPolicy;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

/// A router over the in-memory backend with two known users.
pub struct TestApp {
    pub router: Router,
    pub alice: Uuid,
    pub bob: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::default())
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let tokens = HashMap::from([
            (ALICE_TOKEN.to_string(), alice),
            (BOB_TOKEN.to_string(), bob),
        ]);
        let state = AppState::in_memory(tokens, retention).expect("Failed to build state");
        Self {
            router: build_router(state),
            alice,
            bob,
        }
    }

    /// Send a request, optionally authenticated and with a JSON body.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("Failed to build request"))
            .await
            .expect("Router call failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, Some(ALICE_TOKEN), None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(ALICE_TOKEN), Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Option<Value>) -> Response<Body> {
        self.send(Method::PUT, uri, Some(ALICE_TOKEN), body).await
    }

    pub async fn delete(&self, uri: &str, body: Option<Value>) -> Response<Body> {
        self.send(Method::DELETE, uri, Some(ALICE_TOKEN), body).await
    }

    pub async fn history(&self, scope: Uuid) -> Vec<Value> {
        let response = self.get(&format!("/api/v1/history?scope_id={scope}")).await;
        match body_json(response).await {
            Value::Array(items) => items,
            other => panic!("Expected a history array, got {other}"),
        }
    }

    pub async fn undo(&self, scope: Uuid) -> Value {
        body_json(self.put(&format!("/api/v1/history/undo?scope_id={scope}"), None).await).await
    }

    pub async fn redo(&self, scope: Uuid) -> Value {
        body_json(self.put(&format!("/api/v1/history/redo?scope_id={scope}"), None).await).await
    }

    pub async fn annotations(&self, scope: Uuid) -> Vec<Value> {
        let response = self
            .get(&format!("/api/v1/annotations?dataset_id={scope}"))
            .await;
        match body_json(response).await {
            Value::Array(items) => items,
            other => panic!("Expected an annotation array, got {other}"),
        }
    }

    pub async fn connections(&self, scope: Uuid) -> Vec<Value> {
        let response = self
            .get(&format!("/api/v1/connections?dataset_id={scope}"))
            .await;
        match body_json(response).await {
            Value::Array(items) => items,
            other => panic!("Expected a connection array, got {other}"),
        }
    }
}

/// Read the response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// A valid annotation body in `dataset`.
pub fn annotation(dataset: Uuid, label: &str) -> Value {
    json!({
        "coordinates": [[0, 0], [10, 10]],
        "tags": [label],
        "channel": 0,
        "location": {"x": 0, "y": 0, "z": 0, "t": 0},
        "shape": "line",
        "datasetId": dataset.to_string(),
    })
}

/// A valid connection body between two annotations in `dataset`.
pub fn connection(dataset: Uuid, parent: &str, child: &str) -> Value {
    json!({
        "parentId": parent,
        "childId": child,
        "datasetId": dataset.to_string(),
        "tags": [],
    })
}
