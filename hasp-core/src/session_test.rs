#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::Path;
    use std::time::Duration;

    use crate::error::Error;
    use crate::session::{Session, SessionState};
    use crate::types::LockMode;

    #[test]
    fn fresh_session_defaults() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.resource_name(), None);
        assert_eq!(session.socket_name(), None);
        assert_eq!(session.unicast_address(), None);
        assert_eq!(session.unicast_port(), 28015);
        assert_eq!(session.multicast_address(), None);
        assert_eq!(session.multicast_port(), 28015);
        assert_eq!(session.discovery_attempts(), 2);
        assert_eq!(session.discovery_timeout(), Duration::from_millis(500));
        assert_eq!(session.discovery_ttl(), 1);
        assert_eq!(session.lock_mode(), LockMode::Exclusive);
        assert_eq!(session.resource_quantity(), 1);
        assert!(session.resource_create());
        assert_eq!(session.resource_timeout(), -1);
        assert_eq!(session.resource_idle_lifespan(), 0);
        assert_eq!(session.locked_element(), None);
    }

    #[test]
    fn setters_round_trip() {
        let mut session = Session::new();
        session.set_resource_name("pool[2]").unwrap();
        session.set_socket_name("/tmp/hasp.sock").unwrap();
        session
            .set_unicast_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .unwrap();
        session.set_unicast_port(7001).unwrap();
        session
            .set_multicast_address(IpAddr::V4(Ipv4Addr::new(239, 255, 0, 1)))
            .unwrap();
        session.set_multicast_port(7002).unwrap();
        session.set_discovery_attempts(5).unwrap();
        session
            .set_discovery_timeout(Duration::from_millis(250))
            .unwrap();
        session.set_discovery_ttl(4).unwrap();
        session.set_lock_mode(LockMode::ProtectedRead).unwrap();
        session.set_resource_quantity(2).unwrap();
        session.set_resource_create(false).unwrap();
        session.set_resource_timeout(0).unwrap();
        session.set_resource_idle_lifespan(60000).unwrap();

        assert_eq!(session.resource_name(), Some("pool[2]"));
        assert_eq!(session.socket_name(), Some(Path::new("/tmp/hasp.sock")));
        assert_eq!(
            session.unicast_address(),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert_eq!(session.unicast_port(), 7001);
        assert_eq!(
            session.multicast_address(),
            Some(IpAddr::V4(Ipv4Addr::new(239, 255, 0, 1)))
        );
        assert_eq!(session.multicast_port(), 7002);
        assert_eq!(session.discovery_attempts(), 5);
        assert_eq!(session.discovery_timeout(), Duration::from_millis(250));
        assert_eq!(session.discovery_ttl(), 4);
        assert_eq!(session.lock_mode(), LockMode::ProtectedRead);
        assert_eq!(session.resource_quantity(), 2);
        assert!(!session.resource_create());
        assert_eq!(session.resource_timeout(), 0);
        assert_eq!(session.resource_idle_lifespan(), 60000);
    }

    #[test]
    fn setter_rejects_bad_resource_name() {
        let mut session = Session::new();
        let err = session.set_resource_name("pool[0]").unwrap_err();
        assert!(matches!(err, Error::InvalidResourceName(_)));
        assert_eq!(session.resource_name(), None);
    }

    #[test]
    fn setter_rejects_zero_quantity() {
        let mut session = Session::new();
        assert!(matches!(
            session.set_resource_quantity(0),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(session.resource_quantity(), 1);
    }

    #[test]
    fn setter_rejects_zero_discovery_attempts() {
        let mut session = Session::new();
        assert!(matches!(
            session.set_discovery_attempts(0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn init_moves_to_initialized_once() {
        let mut session = Session::new();
        session.init().unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(matches!(
            session.init(),
            Err(Error::InvalidSequence { call: "init", .. })
        ));
    }

    #[tokio::test]
    async fn lock_requires_init() {
        let mut session = Session::new();
        session.set_resource_name("Red").unwrap();
        assert!(matches!(
            session.lock().await,
            Err(Error::InvalidSequence { call: "lock", .. })
        ));
    }

    #[tokio::test]
    async fn lock_requires_a_resource_name() {
        let mut session = Session::new();
        session.init().unwrap();
        assert!(matches!(
            session.lock().await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn lock_requires_an_endpoint() {
        let mut session = Session::new();
        session.set_resource_name("Red").unwrap();
        session.init().unwrap();
        match session.lock().await {
            Err(Error::InvalidParameter(reason)) => {
                assert!(reason.contains("endpoint"), "unexpected reason: {reason}");
            }
            other => panic!("expected InvalidParameter, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unlock_requires_a_held_lock() {
        let mut session = Session::new();
        session.init().unwrap();
        assert!(matches!(
            session.unlock().await,
            Err(Error::InvalidSequence { call: "unlock", .. })
        ));
        assert!(matches!(
            session.unlock_rollback().await,
            Err(Error::InvalidSequence {
                call: "unlock_rollback",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn ping_requires_init() {
        let mut session = Session::new();
        assert!(matches!(
            session.ping().await,
            Err(Error::InvalidSequence { call: "ping", .. })
        ));
    }

    #[test]
    fn clean_is_terminal() {
        let mut session = Session::new();
        session.clean().unwrap();
        assert_eq!(session.state(), SessionState::Cleaned);
        assert!(matches!(
            session.clean(),
            Err(Error::InvalidSequence { call: "clean", .. })
        ));
        assert!(matches!(
            session.init(),
            Err(Error::InvalidSequence { call: "init", .. })
        ));
        assert!(matches!(
            session.set_resource_name("Red"),
            Err(Error::InvalidSequence { .. })
        ));
    }

    #[test]
    fn clean_after_init() {
        let mut session = Session::new();
        session.init().unwrap();
        session.clean().unwrap();
        assert_eq!(session.state(), SessionState::Cleaned);
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Uninitialized.as_str(), "UNINITIALIZED");
        assert_eq!(SessionState::Initialized.as_str(), "INITIALIZED");
        assert_eq!(SessionState::Locked.as_str(), "LOCKED");
        assert_eq!(SessionState::Cleaned.as_str(), "CLEANED");
        assert_eq!(SessionState::Locked.to_string(), "LOCKED");
    }
}
