//! Round-robin retry scheduler
//!
//! Drives a bounded number of fetch attempts over the candidate URLs. Attempt
//! `j` always targets `urls[j % N]`; after a failed attempt on the last URL,
//! i.e. once a full pass has failed, the scheduler pauses for a constant
//! delay before the next pass. The first response body that decodes as a
//! JSON object ends the run and, when caching is on, is written to the cache.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::cache::CacheStore;
use crate::document::{self, Document};
use crate::fetch::{Candidate, FetchError, FetchRequest, Transport};

/// Suspends the scheduler between passes
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Attempt bound and inter-pass delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 30,
            delay: Duration::from_secs(7),
        }
    }
}

/// States of a scheduler run
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Idle,
    Attempting { attempt: u32, url_index: usize },
    Succeeded { attempt: u32, url_index: usize, document: Document },
    Failed { attempt: u32, url_index: usize },
    Exhausted { attempts: u32 },
}

impl AttemptState {
    /// Leaves `Idle`: the first attempt targets the first URL
    pub fn start(url_count: usize, policy: &RetryPolicy) -> Self {
        if url_count == 0 || policy.max_tries == 0 {
            AttemptState::Exhausted { attempts: 0 }
        } else {
            AttemptState::Attempting {
                attempt: 0,
                url_index: 0,
            }
        }
    }

    /// Moves on from a failed attempt to the next URL, or gives up
    pub fn after_failure(attempt: u32, url_count: usize, policy: &RetryPolicy) -> Self {
        let next = attempt + 1;
        if next >= policy.max_tries {
            AttemptState::Exhausted { attempts: next }
        } else {
            AttemptState::Attempting {
                attempt: next,
                url_index: next as usize % url_count,
            }
        }
    }

    /// Whether a failure at this point closes a full pass with more attempts left
    pub fn pause_due(
        attempt: u32,
        url_index: usize,
        url_count: usize,
        policy: &RetryPolicy,
    ) -> bool {
        url_index + 1 == url_count && attempt + 1 < policy.max_tries
    }
}

/// Terminal result of a scheduler run
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A document was obtained from `urls[url_index]`
    Succeeded {
        document: Document,
        url_index: usize,
        attempts: u32,
    },
    /// Every attempt failed
    Exhausted { attempts: u32 },
}

/// Runs fetch attempts over the candidate URLs
pub struct Scheduler<'a> {
    urls: &'a [Candidate],
    request: &'a FetchRequest,
    policy: RetryPolicy,
    transport: &'a dyn Transport,
    pause: &'a dyn Pause,
    cache: Option<&'a CacheStore>,
    echo_headers: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        urls: &'a [Candidate],
        request: &'a FetchRequest,
        policy: RetryPolicy,
        transport: &'a dyn Transport,
        pause: &'a dyn Pause,
    ) -> Self {
        Self {
            urls,
            request,
            policy,
            transport,
            pause,
            cache: None,
            echo_headers: false,
        }
    }

    /// Persists the successful payload through this store
    pub fn with_cache(mut self, cache: &'a CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Echoes each response's status line and headers to stderr
    pub fn echo_headers(mut self, enabled: bool) -> Self {
        self.echo_headers = enabled;
        self
    }

    /// Runs attempts until one yields a document or the bound is reached
    #[instrument(skip(self), fields(urls = self.urls.len(), max_tries = self.policy.max_tries))]
    pub async fn run(&self) -> Outcome {
        let url_count = self.urls.len();
        let mut state = AttemptState::Idle;

        loop {
            state = match state {
                AttemptState::Idle => AttemptState::start(url_count, &self.policy),
                AttemptState::Attempting { attempt, url_index } => {
                    match self.attempt(attempt, url_index).await {
                        Ok(document) => AttemptState::Succeeded {
                            attempt,
                            url_index,
                            document,
                        },
                        Err(err) => {
                            let url = &self.urls[url_index];
                            debug!(%url, attempt, error = %err, "attempt failed");
                            AttemptState::Failed { attempt, url_index }
                        }
                    }
                }
                AttemptState::Failed { attempt, url_index } => {
                    if AttemptState::pause_due(attempt, url_index, url_count, &self.policy) {
                        debug!(delay = ?self.policy.delay, "pass failed, pausing before retry");
                        self.pause.pause(self.policy.delay).await;
                    }
                    AttemptState::after_failure(attempt, url_count, &self.policy)
                }
                AttemptState::Succeeded {
                    attempt,
                    url_index,
                    document,
                } => {
                    return Outcome::Succeeded {
                        document,
                        url_index,
                        attempts: attempt + 1,
                    };
                }
                AttemptState::Exhausted { attempts } => {
                    return Outcome::Exhausted { attempts };
                }
            };
        }
    }

    async fn attempt(&self, attempt: u32, url_index: usize) -> Result<Document, FetchError> {
        let candidate = &self.urls[url_index];
        debug!(method = %self.request.method, url = %candidate, attempt, "HTTP");

        let response = self.transport.fetch(candidate.url(), self.request).await?;
        if self.echo_headers {
            if let Err(err) = response.write_head(&mut io::stderr().lock()) {
                debug!(error = %err, "cannot echo response head");
            }
        }

        let document = document::decode(&response.body)?;
        if let Some(cache) = self.cache {
            cache.store(candidate.as_str(), &response.body);
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::fetch::FetchResponse;
    use reqwest::header::HeaderMap;
    use reqwest::{StatusCode, Version};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use url::Url;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Call(usize),
        Pause(Duration),
    }

    #[derive(Clone, Copy)]
    enum Reply {
        Json(&'static str),
        Garbage,
        Timeout,
    }

    /// Transport with a fixed reply per URL that records the call order
    struct ScriptedTransport {
        urls: Vec<Url>,
        replies: HashMap<String, Reply>,
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl ScriptedTransport {
        fn new(urls: &[Candidate], replies: &[Reply], events: Arc<Mutex<Vec<Event>>>) -> Self {
            Self {
                urls: urls.iter().map(|c| c.url().clone()).collect(),
                replies: urls
                    .iter()
                    .zip(replies)
                    .map(|(c, r)| (c.url().to_string(), *r))
                    .collect(),
                events,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(
            &self,
            url: &Url,
            request: &FetchRequest,
        ) -> Result<FetchResponse, FetchError> {
            let index = self.urls.iter().position(|u| u == url).expect("known url");
            self.events.lock().unwrap().push(Event::Call(index));

            let body = match self.replies[url.as_str()] {
                Reply::Json(body) => body.as_bytes().to_vec(),
                Reply::Garbage => b"<html>bad gateway</html>".to_vec(),
                Reply::Timeout => return Err(FetchError::Timeout(request.timeout)),
            };
            Ok(FetchResponse {
                version: Version::HTTP_11,
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body,
            })
        }
    }

    struct RecordingPause {
        events: Arc<Mutex<Vec<Event>>>,
    }

    #[async_trait]
    impl Pause for RecordingPause {
        async fn pause(&self, delay: Duration) {
            self.events.lock().unwrap().push(Event::Pause(delay));
        }
    }

    fn urls(count: usize) -> Vec<Candidate> {
        (0..count)
            .map(|i| format!("https://mirror{}.example.com/doc.json", i))
            .map(|text| Candidate::parse(&text).unwrap())
            .collect()
    }

    fn policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy {
            max_tries,
            delay: Duration::from_secs(7),
        }
    }

    fn calls(events: &[Event]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Call(i) => Some(*i),
                Event::Pause(_) => None,
            })
            .collect()
    }

    fn pauses(events: &[Event]) -> usize {
        events.iter().filter(|e| matches!(e, Event::Pause(_))).count()
    }

    async fn run_scripted(
        url_count: usize,
        replies: &[Reply],
        max_tries: u32,
        cache: Option<&CacheStore>,
    ) -> (Outcome, Vec<Event>) {
        let urls = urls(url_count);
        let events = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport::new(&urls, replies, events.clone());
        let pause = RecordingPause {
            events: events.clone(),
        };
        let request = FetchRequest::default();

        let mut scheduler = Scheduler::new(&urls, &request, policy(max_tries), &transport, &pause);
        if let Some(cache) = cache {
            scheduler = scheduler.with_cache(cache);
        }
        let outcome = scheduler.run().await;
        let events = events.lock().unwrap().clone();
        (outcome, events)
    }

    #[tokio::test]
    async fn test_round_robin_order_three_urls_seven_tries() {
        let (outcome, events) =
            run_scripted(3, &[Reply::Garbage, Reply::Timeout, Reply::Garbage], 7, None).await;

        assert_eq!(outcome, Outcome::Exhausted { attempts: 7 });
        assert_eq!(calls(&events), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_pause_only_after_each_full_pass() {
        let (_, events) = run_scripted(3, &[Reply::Garbage; 3], 7, None).await;

        let delay = Duration::from_secs(7);
        assert_eq!(
            events,
            vec![
                Event::Call(0),
                Event::Call(1),
                Event::Call(2),
                Event::Pause(delay),
                Event::Call(0),
                Event::Call(1),
                Event::Call(2),
                Event::Pause(delay),
                Event::Call(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_url_success_first_try() {
        let (outcome, events) = run_scripted(1, &[Reply::Json(r#"{"a":1}"#)], 1, None).await;

        match outcome {
            Outcome::Succeeded {
                document,
                url_index,
                attempts,
            } => {
                assert_eq!(document["a"], 1);
                assert_eq!(url_index, 0);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(pauses(&events), 0);
    }

    #[tokio::test]
    async fn test_single_url_malformed_json_exhausts_with_two_pauses() {
        let (outcome, events) = run_scripted(1, &[Reply::Garbage], 3, None).await;

        assert_eq!(outcome, Outcome::Exhausted { attempts: 3 });
        assert_eq!(calls(&events), vec![0, 0, 0]);
        assert_eq!(pauses(&events), 2);
        assert_ne!(events.last(), Some(&Event::Pause(Duration::from_secs(7))));
    }

    #[tokio::test]
    async fn test_failover_to_second_url() {
        let (outcome, events) =
            run_scripted(2, &[Reply::Timeout, Reply::Json(r#"{"from":"second"}"#)], 4, None).await;

        match outcome {
            Outcome::Succeeded {
                document,
                url_index,
                attempts,
            } => {
                assert_eq!(document["from"], "second");
                assert_eq!(url_index, 1);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(calls(&events), vec![0, 1]);
        assert_eq!(pauses(&events), 0);
    }

    #[tokio::test]
    async fn test_json_array_is_not_a_document() {
        let (outcome, _) = run_scripted(1, &[Reply::Json("[1,2,3]")], 2, None).await;
        assert_eq!(outcome, Outcome::Exhausted { attempts: 2 });
    }

    #[tokio::test]
    async fn test_success_is_written_to_enabled_cache() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(
            dir.path(),
            "tester",
            CachePolicy {
                enabled: true,
                ..Default::default()
            },
        );

        let (outcome, _) = run_scripted(
            2,
            &[Reply::Garbage, Reply::Json(r#"{"cached":true}"#)],
            2,
            Some(&cache),
        )
        .await;

        assert!(matches!(outcome, Outcome::Succeeded { url_index: 1, .. }));
        let second = urls(2).remove(1);
        assert_eq!(cache.lookup(second.as_str()).unwrap(), br#"{"cached":true}"#);
        let first = urls(2).remove(0);
        assert!(!cache.entry_path(first.as_str()).exists());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_never_written() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path(), "tester", CachePolicy::default());

        let (outcome, _) = run_scripted(1, &[Reply::Json("{}")], 1, Some(&cache)).await;

        assert!(matches!(outcome, Outcome::Succeeded { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_state_transitions() {
        let policy = policy(4);
        assert_eq!(
            AttemptState::start(2, &policy),
            AttemptState::Attempting {
                attempt: 0,
                url_index: 0
            }
        );
        assert_eq!(
            AttemptState::after_failure(0, 2, &policy),
            AttemptState::Attempting {
                attempt: 1,
                url_index: 1
            }
        );
        assert_eq!(
            AttemptState::after_failure(1, 2, &policy),
            AttemptState::Attempting {
                attempt: 2,
                url_index: 0
            }
        );
        assert_eq!(
            AttemptState::after_failure(3, 2, &policy),
            AttemptState::Exhausted { attempts: 4 }
        );
        assert_eq!(AttemptState::start(0, &policy), AttemptState::Exhausted { attempts: 0 });
    }

    #[test]
    fn test_pause_due() {
        let policy = policy(7);
        assert!(!AttemptState::pause_due(0, 0, 3, &policy));
        assert!(!AttemptState::pause_due(1, 1, 3, &policy));
        assert!(AttemptState::pause_due(2, 2, 3, &policy));
        assert!(AttemptState::pause_due(5, 2, 3, &policy));
        // last attempt never pauses
        assert!(!AttemptState::pause_due(6, 0, 1, &policy));
    }
}
