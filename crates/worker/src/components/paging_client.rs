use std::sync::Arc;

use agent_core::{traits::TransportBinding, AgentError};
use tracing::{debug, info, warn};

/// 一次 `fetch_all` 的结果
///
/// 出错时保留已累积的信封，`next_cursor` 为出错那一页的游标，下个周期从这里继续。
/// 积压取完时 `next_cursor` 为空。
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub envelopes: Vec<Vec<u8>>,
    pub next_cursor: String,
    pub pages: usize,
    pub error: Option<AgentError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// 分页客户端：沿游标逐页拉取积压任务，页与页之间严格串行
pub struct PagingClient {
    binding: Arc<dyn TransportBinding>,
}

impl PagingClient {
    pub fn new(binding: Arc<dyn TransportBinding>) -> Self {
        Self { binding }
    }

    pub async fn fetch_all(&self, cursor: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome {
            next_cursor: cursor.to_string(),
            ..Default::default()
        };

        loop {
            let page = match self.binding.fetch_page(&outcome.next_cursor).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        cursor = %outcome.next_cursor,
                        fetched = outcome.envelopes.len(),
                        error = %e,
                        "backlog fetch aborted, keeping partial result"
                    );
                    outcome.error = Some(e);
                    return outcome;
                }
            };
            outcome.pages += 1;

            let next = page.last_message_id.clone();
            let page = page.retain_tasks();
            debug!(
                cursor = %outcome.next_cursor,
                next = %next,
                tasks = page.request_list.len(),
                "backlog page received"
            );
            outcome.envelopes.extend(page.into_envelopes());

            if next.is_empty() {
                outcome.next_cursor.clear();
                break;
            }
            if next == outcome.next_cursor {
                warn!(cursor = %next, "orchestrator returned the same cursor, stopping");
                outcome.next_cursor.clear();
                break;
            }
            outcome.next_cursor = next;
        }

        info!(
            pages = outcome.pages,
            tasks = outcome.envelopes.len(),
            "backlog fetched"
        );
        outcome
    }
}
