//! Login-time reconciliation of the anonymous cart with the server cart.

use crate::cart::anonymous::AnonymousCart;
use crate::cart::line::CartLine;
use crate::cart::server::{CartMerger, MergeReport};
use crate::error::CommerceError;
use crate::ids::UserId;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Authentication state seen by the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Authenticated(UserId),
}

impl Session {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Session::Anonymous => None,
            Session::Authenticated(id) => Some(id),
        }
    }
}

/// State of the authenticated cart query.
#[derive(Debug, Clone, PartialEq)]
pub enum CartQuery {
    Loading,
    Ready(Vec<CartLine>),
}

/// What a session change led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// No user, nothing to do.
    NotAuthenticated,
    /// The server cart is still loading.
    Waiting,
    /// This user's anonymous cart was already merged.
    AlreadyMerged,
    /// Guard set, but the anonymous cart was empty.
    NothingToMerge,
    /// Anonymous lines were folded into the server cart.
    Merged(MergeReport),
}

/// Notification published after each merge attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    Merged { user_id: UserId, report: MergeReport },
    MergeFailed { user_id: UserId, message: String },
}

/// Runs the merge once per login transition.
///
/// The guard holds the last user whose cart was merged. It is locked for the
/// whole attempt, so overlapping triggers for the same login wait and then
/// see `AlreadyMerged`. A failed attempt clears it again.
pub struct CartMergeFlow<M> {
    cart: AnonymousCart,
    merger: M,
    last_merged: Mutex<Option<UserId>>,
    events: broadcast::Sender<CartEvent>,
}

impl<M: CartMerger> CartMergeFlow<M> {
    pub fn new(cart: AnonymousCart, merger: M) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cart,
            merger,
            last_merged: Mutex::new(None),
            events,
        }
    }

    /// Receive merge notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    pub async fn last_merged_user(&self) -> Option<UserId> {
        self.last_merged.lock().await.clone()
    }

    pub fn anonymous_cart(&self) -> &AnonymousCart {
        &self.cart
    }

    /// React to a session or cart query change.
    pub async fn on_session_change(
        &self,
        session: &Session,
        query: &CartQuery,
    ) -> Result<MergeOutcome, CommerceError> {
        let Some(user_id) = session.user_id() else {
            return Ok(MergeOutcome::NotAuthenticated);
        };
        let current = match query {
            CartQuery::Loading => {
                debug!(user_id = %user_id, "server cart loading, merge deferred");
                return Ok(MergeOutcome::Waiting);
            }
            CartQuery::Ready(lines) => lines,
        };

        let mut guard = self.last_merged.lock().await;
        if guard.as_ref() == Some(user_id) {
            return Ok(MergeOutcome::AlreadyMerged);
        }
        *guard = Some(user_id.clone());

        match self.merge(user_id, current).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                *guard = None;
                warn!(user_id = %user_id, error = %e, "cart merge failed, will retry on next trigger");
                self.publish(CartEvent::MergeFailed {
                    user_id: user_id.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn merge(&self, user_id: &UserId, current: &[CartLine]) -> Result<MergeOutcome, CommerceError> {
        if self.cart.is_empty()? {
            debug!(user_id = %user_id, "anonymous cart empty");
            return Ok(MergeOutcome::NothingToMerge);
        }

        let report = self
            .cart
            .transfer(|lines| self.merger.merge(user_id, current, lines))
            .await?;

        info!(user_id = %user_id, applied = report.applied(), "login merge complete");
        self.publish(CartEvent::Merged {
            user_id: user_id.clone(),
            report: report.clone(),
        });
        Ok(MergeOutcome::Merged(report))
    }

    fn publish(&self, event: CartEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommerceConfig;
    use crate::ids::ProductId;
    use crate::money::{Currency, Money};
    use crate::promotions::OfferService;
    use async_trait::async_trait;
    use feedme_cache::Cache;
    use feedme_db::Db;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingMerger {
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl CartMerger for CountingMerger {
        async fn merge(
            &self,
            _user_id: &UserId,
            _current: &[CartLine],
            incoming: Vec<CartLine>,
        ) -> Result<MergeReport, CommerceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(CommerceError::Validation("backend rejected merge".into()));
            }
            Ok(MergeReport {
                added: incoming.len(),
                ..MergeReport::default()
            })
        }
    }

    async fn anonymous_with_item() -> AnonymousCart {
        let cart = AnonymousCart::new(Cache::in_memory(), &CommerceConfig::default());
        let offers = OfferService::new(Db::new());
        cart.add_item(
            CartLine::product(ProductId::new("rice"), 2, Money::new(1000, Currency::NGN)),
            &offers,
        )
        .await
        .unwrap();
        cart
    }

    fn ready() -> CartQuery {
        CartQuery::Ready(Vec::new())
    }

    fn ada() -> Session {
        Session::Authenticated(UserId::new("ada"))
    }

    #[tokio::test]
    async fn test_anonymous_and_loading_do_nothing() {
        let merger = CountingMerger::default();
        let flow = CartMergeFlow::new(anonymous_with_item().await, merger.clone());

        let outcome = flow.on_session_change(&Session::Anonymous, &ready()).await.unwrap();
        assert_eq!(outcome, MergeOutcome::NotAuthenticated);

        let outcome = flow.on_session_change(&ada(), &CartQuery::Loading).await.unwrap();
        assert_eq!(outcome, MergeOutcome::Waiting);
        assert!(flow.last_merged_user().await.is_none());
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_merges_once_per_login() {
        let merger = CountingMerger::default();
        let flow = CartMergeFlow::new(anonymous_with_item().await, merger.clone());
        let mut events = flow.subscribe();

        let outcome = flow.on_session_change(&ada(), &ready()).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Merged(ref r) if r.added == 1));
        assert!(flow.anonymous_cart().is_empty().unwrap());

        let again = flow.on_session_change(&ada(), &ready()).await.unwrap();
        assert_eq!(again, MergeOutcome::AlreadyMerged);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);

        match events.recv().await.unwrap() {
            CartEvent::Merged { user_id, report } => {
                assert_eq!(user_id, UserId::new("ada"));
                assert_eq!(report.added, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_cart_sets_guard() {
        let merger = CountingMerger::default();
        let cart = AnonymousCart::new(Cache::in_memory(), &CommerceConfig::default());
        let flow = CartMergeFlow::new(cart, merger.clone());

        let outcome = flow.on_session_change(&ada(), &ready()).await.unwrap();
        assert_eq!(outcome, MergeOutcome::NothingToMerge);
        assert_eq!(flow.last_merged_user().await, Some(UserId::new("ada")));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_resets_guard_and_keeps_lines() {
        let merger = CountingMerger {
            fail_first: true,
            ..CountingMerger::default()
        };
        let flow = CartMergeFlow::new(anonymous_with_item().await, merger.clone());
        let mut events = flow.subscribe();

        assert!(flow.on_session_change(&ada(), &ready()).await.is_err());
        assert!(flow.last_merged_user().await.is_none());
        assert_eq!(flow.anonymous_cart().item_count().unwrap(), 2);
        assert!(matches!(events.recv().await.unwrap(), CartEvent::MergeFailed { .. }));

        let retry = flow.on_session_change(&ada(), &ready()).await.unwrap();
        assert!(matches!(retry, MergeOutcome::Merged(_)));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_logout_keeps_guard_and_new_user_merges() {
        let merger = CountingMerger::default();
        let flow = CartMergeFlow::new(anonymous_with_item().await, merger.clone());

        flow.on_session_change(&ada(), &ready()).await.unwrap();
        flow.on_session_change(&Session::Anonymous, &ready()).await.unwrap();
        assert_eq!(flow.last_merged_user().await, Some(UserId::new("ada")));

        flow.anonymous_cart()
            .add_item(
                CartLine::product(ProductId::new("beans"), 1, Money::new(500, Currency::NGN)),
                &OfferService::new(Db::new()),
            )
            .await
            .unwrap();
        let bola = Session::Authenticated(UserId::new("bola"));
        let outcome = flow.on_session_change(&bola, &ready()).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Merged(_)));
        assert_eq!(merger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_merge_once() {
        let merger = CountingMerger::default();
        let flow = Arc::new(CartMergeFlow::new(anonymous_with_item().await, merger.clone()));

        let attempts = (0..8).map(|_| {
            let flow = flow.clone();
            tokio::spawn(async move { flow.on_session_change(&ada(), &ready()).await })
        });
        let outcomes: Vec<MergeOutcome> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let merged = outcomes.iter().filter(|o| matches!(o, MergeOutcome::Merged(_))).count();
        assert_eq!(merged, 1);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);
    }
}
