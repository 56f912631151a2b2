//! Ambient, per-request principal context.
//!
//! The bearer middleware runs the rest of the request inside
//! [`RequestContext::scope`]; code further down reads it with
//! [`RequestContext::current`] instead of threading it through every call.

use std::future::Future;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    pub principal_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

tokio::task_local! {
    static CURRENT_PRINCIPAL: PrincipalContext;
}

pub struct RequestContext;

impl RequestContext {
    pub async fn scope<F>(context: PrincipalContext, f: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_PRINCIPAL.scope(context, f).await
    }

    /// `None` outside a scope, i.e. for anonymous or background work.
    pub fn current() -> Option<PrincipalContext> {
        CURRENT_PRINCIPAL.try_with(|ctx| ctx.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PrincipalContext {
        PrincipalContext {
            principal_id: Uuid::new_v4(),
            tenant_id: None,
            role: "admin".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn visible_only_inside_scope() {
        assert!(RequestContext::current().is_none());

        let ctx = context();
        let seen = RequestContext::scope(ctx.clone(), async { RequestContext::current() }).await;
        assert_eq!(seen, Some(ctx));

        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn not_inherited_by_spawned_tasks() {
        let seen = RequestContext::scope(context(), async {
            tokio::spawn(async { RequestContext::current() }).await.unwrap()
        })
        .await;
        assert!(seen.is_none());
    }
}
