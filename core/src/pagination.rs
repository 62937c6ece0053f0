/// Pull side of the engine: paginated history fetches
///
/// Server order contract: page 0 holds the newest messages; within a page,
/// `content` is ordered oldest-first. The merge re-sorts everything anyway,
/// so only `last` and `totalElements` are order-sensitive.
use crate::error::{ChatError, Result};
use crate::message::ChatMessage;
use crate::session::SessionHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One page of conversation history, as served by
/// `GET /messages/{senderId}/{recipientId}/paginated?page=N&size=M`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub content: Vec<ChatMessage>,
    pub total_elements: u64,
    pub total_pages: u32,
    pub size: u32,
    pub number: u32,
    pub first: bool,
    pub last: bool,
}

/// Backfill position within the active conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    pub total_count: u64,
}

impl PaginationCursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size,
            has_more: true,
            total_count: 0,
        }
    }

    /// Back to page 0, called whenever the selected conversation changes
    pub fn reset(&mut self) {
        self.page = 0;
        self.has_more = true;
        self.total_count = 0;
    }

    /// Record a successfully fetched page
    pub fn advance(&mut self, resp: &PageResponse) {
        self.has_more = !resp.last;
        self.total_count = resp.total_elements;
    }
}

/// Fetches one page of history. Idempotent and safe to retry; a failure
/// never means the conversation is empty.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        requester_id: i64,
        peer_id: i64,
        page: u32,
        size: u32,
    ) -> Result<PageResponse>;
}

/// HTTP implementation over the REST pull API, bearer-authenticated from the
/// session handle.
pub struct HttpPageFetcher {
    http: reqwest::Client,
    base_url: String,
    session: SessionHandle,
}

impl HttpPageFetcher {
    pub fn new(base_url: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            session,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(
        &self,
        requester_id: i64,
        peer_id: i64,
        page: u32,
        size: u32,
    ) -> Result<PageResponse> {
        let token = self
            .session
            .token()
            .ok_or_else(|| ChatError::Fetch("No active session".to_string()))?;

        let url = format!(
            "{}/messages/{}/{}/paginated?page={}&size={}",
            self.base_url, requester_id, peer_id, page, size
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ChatError::Fetch(format!("Request to {} failed: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(ChatError::Fetch(format!(
                "HTTP {} fetching page {} of {}",
                resp.status(),
                page,
                url
            )));
        }

        resp.json::<PageResponse>()
            .await
            .map_err(|e| ChatError::Fetch(format!("Invalid page body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response_json_shape() {
        let json = r#"{
            "content": [{
                "id": 1,
                "senderId": 1,
                "recipientId": 2,
                "content": "hi",
                "timestamp": "2023-11-14T22:13:20Z",
                "messageType": "TEXT"
            }],
            "totalElements": 31,
            "totalPages": 3,
            "size": 15,
            "number": 0,
            "first": true,
            "last": false
        }"#;
        let page: PageResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.total_elements, 31);
        assert!(!page.last);
    }

    #[test]
    fn test_cursor_reset_and_advance() {
        let mut cursor = PaginationCursor::new(15);
        cursor.page = 2;
        cursor.advance(&PageResponse {
            content: Vec::new(),
            total_elements: 40,
            total_pages: 3,
            size: 15,
            number: 2,
            first: false,
            last: true,
        });
        assert!(!cursor.has_more);
        assert_eq!(cursor.total_count, 40);

        cursor.reset();
        assert_eq!(cursor.page, 0);
        assert!(cursor.has_more);
    }
}
