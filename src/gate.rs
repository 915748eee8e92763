use std::collections::HashSet;

use crate::{
    auth::Principal,
    error::{AppError, StoreError},
    models::{Article, Subscription, Theme, User},
    repository::{RepositoryState, SubscriptionState},
};

/// Why the gate answered the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    Subscribed,
    NoSubscription,
    Unsubscribed,
}

/// AccessDecision
///
/// Ephemeral verdict for one `(principal, theme)` pair. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn from_subscription(subscription: Option<&Subscription>) -> Self {
        let reason = match subscription {
            None => AccessReason::NoSubscription,
            Some(row) if row.is_subscribed => AccessReason::Subscribed,
            Some(_) => AccessReason::Unsubscribed,
        };
        Self {
            allowed: reason == AccessReason::Subscribed,
            reason,
        }
    }
}

/// Result of a successful `subscribe`. `Created` maps to 201, `Resubscribed` to 200.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Created(Subscription),
    Resubscribed(Subscription),
}

const ALREADY_SUBSCRIBED: &str = "You are already subscribed to this theme!";
const NOT_SUBSCRIBED: &str = "You cannot unsubscribe from a theme you are not subscribed to!";

/// AuthorizationGate
///
/// Subscription-based access control for theme-scoped content, plus the
/// subscribe/unsubscribe state machine. Holds only shared collaborator handles;
/// every decision is computed from the store on each call.
#[derive(Clone)]
pub struct AuthorizationGate {
    repo: RepositoryState,
    subscriptions: SubscriptionState,
}

impl AuthorizationGate {
    pub fn new(repo: RepositoryState, subscriptions: SubscriptionState) -> Self {
        Self {
            repo,
            subscriptions,
        }
    }

    /// require_user
    ///
    /// Resolves the principal to its stored user. A token whose user has since
    /// disappeared is treated as an authentication failure.
    pub async fn require_user(&self, principal: Principal) -> Result<User, AppError> {
        self.repo
            .get_user(principal.user_id)
            .await?
            .ok_or_else(|| AppError::Authentication("User not found".to_string()))
    }

    pub async fn require_theme(&self, theme_id: i64) -> Result<Theme, AppError> {
        self.repo
            .get_theme(theme_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Theme not found".to_string()))
    }

    pub async fn decide(
        &self,
        principal: Principal,
        theme_id: i64,
    ) -> Result<AccessDecision, AppError> {
        let subscription = self
            .subscriptions
            .find(principal.user_id, theme_id)
            .await?;
        Ok(AccessDecision::from_subscription(subscription.as_ref()))
    }

    /// authorize_theme
    ///
    /// Allows only when a row exists for the pair and it is currently subscribed.
    pub async fn authorize_theme(&self, principal: Principal, theme_id: i64) -> Result<(), AppError> {
        let decision = self.decide(principal, theme_id).await?;
        if decision.allowed {
            return Ok(());
        }
        tracing::debug!(
            user_id = principal.user_id,
            theme_id,
            reason = ?decision.reason,
            "theme access denied"
        );
        Err(AppError::Authorization(
            "You must be subscribed to this theme to access its content".to_string(),
        ))
    }

    /// authorize_article
    ///
    /// Looks up the article, then gates on its theme. Returns the article on success.
    pub async fn authorize_article(
        &self,
        principal: Principal,
        article_id: i64,
    ) -> Result<Article, AppError> {
        let article = self
            .repo
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Article not found".to_string()))?;
        self.authorize_theme(principal, article.theme_id).await?;
        Ok(article)
    }

    /// visible_articles
    ///
    /// Articles whose theme the principal currently subscribes to, in the source
    /// list's order (creation order), not subscription order.
    pub async fn visible_articles(&self, principal: Principal) -> Result<Vec<Article>, AppError> {
        let subscribed: HashSet<i64> = self
            .subscriptions
            .list_for_user(principal.user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_subscribed)
            .map(|s| s.theme_id)
            .collect();

        let articles = self.repo.get_articles().await?;
        Ok(articles
            .into_iter()
            .filter(|a| subscribed.contains(&a.theme_id))
            .collect())
    }

    /// subscribe
    ///
    /// No row → create subscribed. Unsubscribed row → flip to subscribed.
    /// Subscribed row → no-op conflict. A lost creation race (the store's unique
    /// key fires) and a lost flip race both resolve to the same conflict.
    pub async fn subscribe(&self, user_id: i64, theme_id: i64) -> Result<SubscribeOutcome, AppError> {
        self.require_theme(theme_id).await?;

        match self.subscriptions.find(user_id, theme_id).await? {
            None => match self.subscriptions.create(user_id, theme_id, true).await {
                Ok(row) => {
                    tracing::info!(user_id, theme_id, "subscription created");
                    Ok(SubscribeOutcome::Created(row))
                }
                Err(StoreError::UniqueViolation(constraint)) => {
                    tracing::warn!(user_id, theme_id, %constraint, "concurrent subscribe lost the race");
                    Err(AppError::SubscriptionConflict(ALREADY_SUBSCRIBED.to_string()))
                }
                Err(e) => Err(e.into()),
            },
            Some(row) if row.is_subscribed => {
                Err(AppError::SubscriptionConflict(ALREADY_SUBSCRIBED.to_string()))
            }
            Some(mut row) => {
                if !self.subscriptions.set_subscribed(row.id, true).await? {
                    return Err(AppError::SubscriptionConflict(ALREADY_SUBSCRIBED.to_string()));
                }
                tracing::info!(user_id, theme_id, "subscription re-enabled");
                row.is_subscribed = true;
                Ok(SubscribeOutcome::Resubscribed(row))
            }
        }
    }

    /// unsubscribe
    ///
    /// No row → not found. Unsubscribed row → no-op conflict. Subscribed row → flip off.
    pub async fn unsubscribe(&self, user_id: i64, theme_id: i64) -> Result<Subscription, AppError> {
        self.require_theme(theme_id).await?;

        let Some(mut row) = self.subscriptions.find(user_id, theme_id).await? else {
            return Err(AppError::NotFound("Subscription does not exist!".to_string()));
        };
        if !row.is_subscribed || !self.subscriptions.set_subscribed(row.id, false).await? {
            return Err(AppError::SubscriptionConflict(NOT_SUBSCRIBED.to_string()));
        }
        tracing::info!(user_id, theme_id, "subscription disabled");
        row.is_subscribed = false;
        Ok(row)
    }
}
