//! Single owner of the dashboard's shared state.
//!
//! Every change replaces the relevant part of the snapshot under one lock and is then
//! broadcast to subscribers. Async work is bracketed by `begin_*`/`finish_*` pairs; the
//! ticket handed out by `begin_*` is checked on `finish_*` so a response that lost a race
//! against a newer request or a newer selection is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::insights::NewsItem;
use crate::metrics::{Coordinates, ImpactMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewMode {
    #[default]
    Home,
    Dashboard,
    Map,
    Reports,
    AiAnalyst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    MapClick,
    AlertClick,
    ManualEntry,
    PlaceSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    View,
    Selection(SelectionSource),
    InsightsPending,
    Insights,
    NewsPending,
    News,
    PlaceSearchPending,
    PlaceSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub revision: u64,
    pub view: ViewMode,
    pub metrics: ImpactMetrics,
    pub coordinates: Option<Coordinates>,
    pub insights: Option<String>,
    pub analyzing: bool,
    pub news: Vec<NewsItem>,
    pub loading_news: bool,
    pub searching_place: bool,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            view: ViewMode::default(),
            metrics: ImpactMetrics::no_selection(),
            coordinates: None,
            insights: None,
            analyzing: false,
            news: Vec::new(),
            loading_news: false,
            searching_place: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateUpdate {
    pub reason: UpdateReason,
    pub snapshot: DashboardSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Insights,
    News,
    PlaceSearch,
}

/// Proof that a request was started; checked again when its response lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    kind: RequestKind,
    generation: u64,
    selection: u64,
}

#[derive(Default)]
struct StoreInner {
    snapshot: DashboardSnapshot,
    selection_generation: u64,
    insights_generation: u64,
    news_generation: u64,
    place_generation: u64,
}

impl StoreInner {
    fn ticket(&mut self, kind: RequestKind) -> RequestTicket {
        let counter = match kind {
            RequestKind::Insights => &mut self.insights_generation,
            RequestKind::News => &mut self.news_generation,
            RequestKind::PlaceSearch => &mut self.place_generation,
        };
        *counter += 1;
        RequestTicket {
            kind,
            generation: *counter,
            selection: self.selection_generation,
        }
    }

    fn is_current(&self, ticket: &RequestTicket) -> bool {
        match ticket.kind {
            RequestKind::Insights => {
                ticket.generation == self.insights_generation
                    && ticket.selection == self.selection_generation
            }
            RequestKind::News => ticket.generation == self.news_generation,
            RequestKind::PlaceSearch => {
                ticket.generation == self.place_generation
                    && ticket.selection == self.selection_generation
            }
        }
    }

    fn replace_selection(&mut self, metrics: ImpactMetrics, at: Coordinates) {
        self.selection_generation += 1;
        self.snapshot.metrics = metrics;
        self.snapshot.coordinates = Some(at);
        self.snapshot.insights = None;
        self.snapshot.analyzing = false;
    }
}

pub struct DashboardStore {
    inner: Mutex<StoreInner>,
    updates: broadcast::Sender<StateUpdate>,
}

impl DashboardStore {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(StoreInner::default()),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn metrics(&self) -> ImpactMetrics {
        self.lock().snapshot.metrics.clone()
    }

    /// Switches view and returns the previous one.
    pub fn set_view(&self, view: ViewMode) -> ViewMode {
        self.mutate(UpdateReason::View, |inner| {
            std::mem::replace(&mut inner.snapshot.view, view)
        })
    }

    /// Replaces the current selection wholesale and clears any insights text.
    pub fn select(
        &self,
        metrics: ImpactMetrics,
        at: Coordinates,
        source: SelectionSource,
    ) -> DashboardSnapshot {
        info!(region = %metrics.region, ?source, "selection changed");
        self.mutate(UpdateReason::Selection(source), |inner| {
            inner.replace_selection(metrics, at);
            inner.snapshot.clone()
        })
    }

    /// Starts an insights request for the current selection. `None` while nothing is
    /// selected.
    pub fn begin_insights(&self) -> Option<(RequestTicket, ImpactMetrics)> {
        let mut inner = self.lock();
        if !inner.snapshot.metrics.has_selection() {
            return None;
        }
        let ticket = inner.ticket(RequestKind::Insights);
        inner.snapshot.analyzing = true;
        let metrics = inner.snapshot.metrics.clone();
        self.publish(&mut inner, UpdateReason::InsightsPending);
        Some((ticket, metrics))
    }

    pub fn finish_insights(&self, ticket: RequestTicket, text: String) -> bool {
        self.finish(ticket, UpdateReason::Insights, |inner| {
            inner.snapshot.insights = Some(text);
            inner.snapshot.analyzing = false;
        })
    }

    pub fn begin_news(&self) -> RequestTicket {
        let mut inner = self.lock();
        let ticket = inner.ticket(RequestKind::News);
        inner.snapshot.loading_news = true;
        self.publish(&mut inner, UpdateReason::NewsPending);
        ticket
    }

    pub fn finish_news(&self, ticket: RequestTicket, news: Vec<NewsItem>) -> bool {
        self.finish(ticket, UpdateReason::News, |inner| {
            inner.snapshot.news = news;
            inner.snapshot.loading_news = false;
        })
    }

    /// Starts a place search. Blank queries are ignored.
    pub fn begin_place_search(&self, query: &str) -> Option<RequestTicket> {
        if query.trim().is_empty() {
            return None;
        }
        let mut inner = self.lock();
        let ticket = inner.ticket(RequestKind::PlaceSearch);
        inner.snapshot.searching_place = true;
        self.publish(&mut inner, UpdateReason::PlaceSearchPending);
        Some(ticket)
    }

    /// Lands a place search. A resolved point becomes the new selection unless the user
    /// picked something else meanwhile.
    pub fn finish_place_search(
        &self,
        ticket: RequestTicket,
        resolved: Option<(ImpactMetrics, Coordinates)>,
    ) -> bool {
        self.finish(ticket, UpdateReason::PlaceSearch, |inner| {
            inner.snapshot.searching_place = false;
            if let Some((metrics, at)) = resolved {
                inner.replace_selection(metrics, at);
            }
        })
    }

    fn finish(
        &self,
        ticket: RequestTicket,
        reason: UpdateReason,
        apply: impl FnOnce(&mut StoreInner),
    ) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(&ticket) {
            debug!(kind = ?ticket.kind, "dropping stale response");
            if ticket.kind == RequestKind::PlaceSearch
                && ticket.generation == inner.place_generation
            {
                inner.snapshot.searching_place = false;
                self.publish(&mut inner, reason);
            }
            return false;
        }
        apply(&mut *inner);
        self.publish(&mut inner, reason);
        true
    }

    fn mutate<T>(&self, reason: UpdateReason, apply: impl FnOnce(&mut StoreInner) -> T) -> T {
        let mut inner = self.lock();
        let result = apply(&mut *inner);
        self.publish(&mut inner, reason);
        result
    }

    fn publish(&self, inner: &mut StoreInner, reason: UpdateReason) {
        inner.snapshot.revision += 1;
        // No subscribers is fine.
        let _ = self.updates.send(StateUpdate {
            reason,
            snapshot: inner.snapshot.clone(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new(256)
    }
}
