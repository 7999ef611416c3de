// src/pipeline/cycle.rs

//! One sync cycle over every subscribed board.
//!
//! ```text
//! Start ──▶ PerBoard (task per board) ──▶ PerThread (bounded stream)
//!                                            │
//!   Commit ◀── Aggregate (mpsc) ◀────────────┘
//! ```
//!
//! The cursor read at Start (`T0`) bounds which posts are new. Every thread
//! unit reports the newest post it saw (or `T0`), board tasks report their
//! maximum over a channel, and the cycle commits the overall maximum only if
//! it moved forward. Deliveries are spawned fire-and-forget and are not part
//! of the join.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, Subscription, User};
use crate::query::{CompiledQuery, FileTypes};
use crate::services::{Requester, Sink};
use crate::storage::ReadModel;

/// Tunables of a sync cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    /// Thread units running at once inside one board
    pub max_concurrent: usize,

    /// Upper bound on the whole cycle, deliveries excluded
    pub deadline: Duration,
}

impl From<&CrawlerConfig> for CycleSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            deadline: Duration::from_secs(config.cycle_deadline_secs),
        }
    }
}

/// Summary of a finished cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub boards: usize,
    pub board_failures: usize,
    pub threads_matched: usize,
    pub thread_failures: usize,
    pub cursor_before: u64,
    pub cursor_after: u64,
    deliveries: Vec<JoinHandle<()>>,
}

impl CycleReport {
    /// Number of deliveries dispatched.
    pub fn deliveries(&self) -> usize {
        self.deliveries.len()
    }

    pub fn advanced(&self) -> bool {
        self.cursor_after > self.cursor_before
    }

    /// Wait for every dispatched delivery. Returns how many ran to completion.
    pub async fn wait_for_deliveries(&mut self) -> usize {
        let mut completed = 0;
        for handle in self.deliveries.drain(..) {
            match handle.await {
                Ok(()) => completed += 1,
                Err(e) => log::error!("Delivery task failed: {}", e),
            }
        }
        completed
    }
}

/// A subscriber of a matched thread together with its file filter.
#[derive(Debug, Clone)]
struct UserRequest {
    user: User,
    types: FileTypes,
}

/// Collaborators shared by every task of one cycle.
#[derive(Clone)]
struct CycleContext {
    read_model: Arc<dyn ReadModel>,
    requester: Arc<dyn Requester>,
    sink: Arc<dyn Sink>,
    cursor: u64,
    max_concurrent: usize,
}

#[derive(Debug)]
struct BoardOutcome {
    board: String,
    max_timestamp: u64,
    failed: bool,
    threads_matched: usize,
    thread_failures: usize,
    deliveries: Vec<JoinHandle<()>>,
}

#[derive(Debug)]
struct ThreadOutcome {
    max_timestamp: u64,
    failed: bool,
    deliveries: Vec<JoinHandle<()>>,
}

/// Runs sync cycles against a read model, a requester and a sink.
pub struct Crawler {
    read_model: Arc<dyn ReadModel>,
    requester: Arc<dyn Requester>,
    sink: Arc<dyn Sink>,
    settings: CycleSettings,
    gate: Mutex<()>,
}

impl Crawler {
    pub fn new(
        read_model: Arc<dyn ReadModel>,
        requester: Arc<dyn Requester>,
        sink: Arc<dyn Sink>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            read_model,
            requester,
            sink,
            settings,
            gate: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> CycleSettings {
        self.settings
    }

    /// Run one cycle.
    ///
    /// Fails with `CycleInProgress` if another cycle is running, and with
    /// `CycleDeadline` if the boards do not finish in time. In both cases the
    /// cursor is left untouched.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _running = self
            .gate
            .try_lock()
            .map_err(|_| AppError::CycleInProgress)?;
        let started_at = Utc::now();

        // Start
        let cursor = self.read_model.cursor().await?;
        let by_board = group_by_board(self.read_model.subscriptions().await?);
        log::info!(
            "Sync cycle started: {} boards, cursor {}",
            by_board.len(),
            cursor
        );

        // PerBoard
        let context = CycleContext {
            read_model: Arc::clone(&self.read_model),
            requester: Arc::clone(&self.requester),
            sink: Arc::clone(&self.sink),
            cursor,
            max_concurrent: self.settings.max_concurrent.max(1),
        };
        let board_count = by_board.len();
        let (tx, mut rx) = mpsc::channel(board_count.max(1));
        let mut tasks = JoinSet::new();
        for (board, subscriptions) in by_board {
            let context = context.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let outcome = crawl_board(context, board, subscriptions).await;
                // Receiver only goes away when the cycle is abandoned
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        // Aggregate
        let collect = async {
            let mut outcomes = Vec::with_capacity(board_count);
            while let Some(outcome) = rx.recv().await {
                outcomes.push(outcome);
            }
            outcomes
        };
        let outcomes = match tokio::time::timeout(self.settings.deadline, collect).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                tasks.abort_all();
                log::error!(
                    "Sync cycle exceeded {:?}; cursor stays at {}",
                    self.settings.deadline,
                    cursor
                );
                return Err(AppError::CycleDeadline {
                    secs: self.settings.deadline.as_secs(),
                });
            }
        };
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Board task failed: {}", e);
            }
        }

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            boards: board_count,
            // Boards whose task died never reported
            board_failures: board_count - outcomes.len(),
            threads_matched: 0,
            thread_failures: 0,
            cursor_before: cursor,
            cursor_after: cursor,
            deliveries: Vec::new(),
        };
        let mut newest = cursor;
        for outcome in outcomes {
            if outcome.failed {
                report.board_failures += 1;
            }
            log::debug!(
                "/{}/: {} matched threads, {} deliveries, newest post {}",
                outcome.board,
                outcome.threads_matched,
                outcome.deliveries.len(),
                outcome.max_timestamp
            );
            newest = newest.max(outcome.max_timestamp);
            report.threads_matched += outcome.threads_matched;
            report.thread_failures += outcome.thread_failures;
            report.deliveries.extend(outcome.deliveries);
        }

        // Commit
        if newest > cursor {
            if self.read_model.advance_cursor(newest).await? {
                report.cursor_after = newest;
            } else {
                report.cursor_after = self.read_model.cursor().await?;
                log::warn!(
                    "Cursor was already moved to {}; {} not stored",
                    report.cursor_after,
                    newest
                );
            }
        }

        report.finished_at = Utc::now();
        log::info!(
            "Sync cycle done: {} boards ({} failed), {} matched threads ({} failed), {} deliveries, cursor {} -> {}",
            report.boards,
            report.board_failures,
            report.threads_matched,
            report.thread_failures,
            report.deliveries(),
            report.cursor_before,
            report.cursor_after
        );
        Ok(report)
    }
}

fn group_by_board(subscriptions: Vec<Subscription>) -> BTreeMap<String, Vec<Subscription>> {
    let mut by_board: BTreeMap<String, Vec<Subscription>> = BTreeMap::new();
    for subscription in subscriptions {
        by_board
            .entry(subscription.board.clone())
            .or_default()
            .push(subscription);
    }
    by_board
}

async fn crawl_board(
    context: CycleContext,
    board: String,
    subscriptions: Vec<Subscription>,
) -> BoardOutcome {
    let mut outcome = BoardOutcome {
        board: board.clone(),
        max_timestamp: context.cursor,
        failed: false,
        threads_matched: 0,
        thread_failures: 0,
        deliveries: Vec::new(),
    };

    let list = match context.requester.list_threads(&board).await {
        Ok(list) => list,
        Err(e) => {
            log::warn!("Failed to list /{}/: {}", board, e);
            outcome.failed = true;
            return outcome;
        }
    };

    let queries: Vec<(Subscription, CompiledQuery)> = subscriptions
        .into_iter()
        .map(|s| {
            let query = CompiledQuery::compile(&s);
            (s, query)
        })
        .collect();

    let matched: Vec<(String, Vec<usize>)> = list
        .threads
        .into_iter()
        .filter_map(|thread| {
            let hits: Vec<usize> = queries
                .iter()
                .enumerate()
                .filter(|(_, (_, query))| query.matches_text(&thread.comment))
                .map(|(i, _)| i)
                .collect();
            (!hits.is_empty()).then_some((thread.id, hits))
        })
        .collect();

    // One lookup per subscription that matched at least one thread
    let needed: BTreeSet<usize> = matched
        .iter()
        .flat_map(|(_, hits)| hits.iter().copied())
        .collect();
    let lookups = needed.into_iter().map(|i| {
        let context = &context;
        let board = &board;
        let subscription = &queries[i].0;
        async move {
            let users = match context.read_model.subscribers_of(subscription).await {
                Ok(users) => users,
                Err(e) => {
                    log::warn!(
                        "Skipping subscription {} on /{}/: {}",
                        subscription.id,
                        board,
                        e
                    );
                    Vec::new()
                }
            };
            (i, users)
        }
    });
    let subscribers: HashMap<usize, Vec<User>> =
        future::join_all(lookups).await.into_iter().collect();

    let mut jobs = Vec::new();
    for (thread_id, hits) in matched {
        let requests: Vec<UserRequest> = hits
            .iter()
            .flat_map(|i| {
                let types = queries[*i].1.types;
                subscribers
                    .get(i)
                    .into_iter()
                    .flatten()
                    .map(move |user| UserRequest {
                        user: user.clone(),
                        types,
                    })
            })
            .collect();
        if !requests.is_empty() {
            jobs.push((thread_id, requests));
        }
    }
    outcome.threads_matched = jobs.len();

    // PerThread
    let concurrency = context.max_concurrent;
    let results: Vec<ThreadOutcome> = stream::iter(jobs)
        .map(|(thread_id, requests)| {
            let context = context.clone();
            let board = board.clone();
            async move { crawl_thread(&context, &board, thread_id, requests).await }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for result in results {
        if result.failed {
            outcome.thread_failures += 1;
        }
        outcome.max_timestamp = outcome.max_timestamp.max(result.max_timestamp);
        outcome.deliveries.extend(result.deliveries);
    }
    outcome
}

async fn crawl_thread(
    context: &CycleContext,
    board: &str,
    thread_id: String,
    requests: Vec<UserRequest>,
) -> ThreadOutcome {
    let mut outcome = ThreadOutcome {
        max_timestamp: context.cursor,
        failed: false,
        deliveries: Vec::new(),
    };

    let posts = match context.requester.get_thread(board, &thread_id).await {
        Ok(posts) => posts,
        Err(e) => {
            log::warn!("Failed to fetch thread /{}/{}: {}", board, thread_id, e);
            outcome.failed = true;
            return outcome;
        }
    };

    for post in posts.posts {
        if post.timestamp <= context.cursor {
            continue;
        }
        outcome.max_timestamp = outcome.max_timestamp.max(post.timestamp);
        for file in &post.files {
            let receivers = receivers_for(&requests, &file.name);
            if receivers.is_empty() {
                continue;
            }
            let locator = context.requester.resource_url(&file.path);
            outcome.deliveries.push(dispatch(
                Arc::clone(&context.sink),
                receivers,
                locator,
                thread_id.clone(),
            ));
        }
    }
    outcome
}

/// Users whose type filter accepts `file_name`, each user once.
fn receivers_for(requests: &[UserRequest], file_name: &str) -> Vec<User> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|r| r.types.matches(file_name))
        .filter(|r| seen.insert(r.user.id))
        .map(|r| r.user.clone())
        .collect()
}

fn dispatch(
    sink: Arc<dyn Sink>,
    recipients: Vec<User>,
    locator: String,
    caption: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.send(&recipients, &locator, &caption).await {
            log::warn!("Delivery of {} failed: {}", locator, e);
        }
    })
}
