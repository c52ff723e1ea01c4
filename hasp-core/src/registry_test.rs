#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tokio::sync::oneshot;

    use crate::error::Error;
    use crate::registry::{Registry, ResourceRef};
    use crate::scheduler::{Cmd, LockReply, UnlockReply};
    use crate::types::{LockMode, ResourceName};

    fn name(s: &str) -> ResourceName {
        s.parse().unwrap()
    }

    async fn grant(res: &ResourceRef, session: &str) {
        let (tx, rx) = oneshot::channel();
        res.sender()
            .send(Cmd::Lock {
                session: session.to_string(),
                mode: LockMode::Exclusive,
                quantity: 1,
                wait: false,
                reply: tx,
            })
            .await
            .unwrap();
        assert!(matches!(rx.await.unwrap(), LockReply::Granted { .. }));
    }

    async fn release(res: &ResourceRef, session: &str) {
        let (tx, rx) = oneshot::channel();
        res.sender()
            .send(Cmd::Unlock {
                session: session.to_string(),
                rollback: false,
                reply: tx,
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), UnlockReply::Released);
    }

    #[tokio::test]
    async fn resolve_without_create_fails_on_unknown() {
        let registry = Registry::new();
        let err = registry
            .resolve(&name("ghost"), false, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn resolve_reuses_the_live_actor() {
        let registry = Registry::new();
        let a = registry.resolve(&name("Red"), true, Duration::ZERO).unwrap();
        let b = registry.resolve(&name("Red"), false, Duration::ZERO).unwrap();
        assert_eq!(registry.len(), 1);
        // both references reach the same holder set
        grant(&a, "s1").await;
        let (tx, rx) = oneshot::channel();
        b.sender()
            .send(Cmd::Lock {
                session: "s2".to_string(),
                mode: LockMode::Exclusive,
                quantity: 1,
                wait: false,
                reply: tx,
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), LockReply::Busy);
    }

    #[tokio::test]
    async fn pinned_resources_survive_the_sweep() {
        let registry = Registry::new();
        let pin = registry.resolve(&name("Red"), true, Duration::ZERO).unwrap();
        let far = Instant::now() + Duration::from_secs(3600);
        assert!(registry.sweep(far).is_empty());
        assert!(registry.contains("Red"));
        drop(pin);
        assert_eq!(registry.sweep(far), ["Red"]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn zero_lifespan_evicts_on_the_first_sweep() {
        let registry = Registry::new();
        drop(registry.resolve(&name("Red"), true, Duration::ZERO).unwrap());
        assert_eq!(
            registry.sweep(Instant::now() + Duration::from_millis(1)),
            ["Red"]
        );
    }

    #[tokio::test]
    async fn lifespan_holds_eviction_until_it_elapses() {
        let registry = Registry::new();
        let born = Instant::now();
        drop(
            registry
                .resolve(&name("Red"), true, Duration::from_millis(50))
                .unwrap(),
        );
        assert!(registry.sweep(born + Duration::from_millis(10)).is_empty());
        assert!(registry.contains("Red"));
        assert_eq!(registry.sweep(born + Duration::from_millis(60)), ["Red"]);
    }

    #[tokio::test]
    async fn held_locks_block_eviction_without_a_pin() {
        let registry = Registry::new();
        let res = registry.resolve(&name("Red"), true, Duration::ZERO).unwrap();
        grant(&res, "s1").await;
        // the session abandoned its reference but not its lock
        drop(res);
        let far = Instant::now() + Duration::from_secs(3600);
        assert!(registry.sweep(far).is_empty());
        assert!(registry.contains("Red"));
    }

    #[tokio::test]
    async fn idle_clock_starts_at_the_release() {
        let registry = Registry::new();
        let res = registry
            .resolve(&name("Red"), true, Duration::from_millis(50))
            .unwrap();
        grant(&res, "s1").await;
        // hold well past the lifespan; busy time must not count
        tokio::time::sleep(Duration::from_millis(80)).await;
        release(&res, "s1").await;
        let released = Instant::now();
        drop(res);
        assert!(registry.sweep(released + Duration::from_millis(10)).is_empty());
        assert_eq!(registry.sweep(released + Duration::from_millis(60)), ["Red"]);
    }
}
