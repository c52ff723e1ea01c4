#[cfg(test)]
mod tests {
    use crate::compat::ModeMatrix;
    use crate::types::LockMode;

    const ALL: [LockMode; 6] = [
        LockMode::Null,
        LockMode::ConcurrentRead,
        LockMode::ConcurrentWrite,
        LockMode::ProtectedRead,
        LockMode::ProtectedWrite,
        LockMode::Exclusive,
    ];

    // =========================================================================
    // Pair-level matrix facts
    // =========================================================================

    #[test]
    fn null_compatible_with_everything() {
        for mode in ALL {
            assert!(
                ModeMatrix::compatible(LockMode::Null, mode),
                "NL should admit {:?}",
                mode
            );
            assert!(
                ModeMatrix::compatible(mode, LockMode::Null),
                "{:?} should admit NL",
                mode
            );
        }
    }

    #[test]
    fn exclusive_admits_only_null() {
        assert!(ModeMatrix::compatible(LockMode::Exclusive, LockMode::Null));
        for mode in [
            LockMode::ConcurrentRead,
            LockMode::ConcurrentWrite,
            LockMode::ProtectedRead,
            LockMode::ProtectedWrite,
            LockMode::Exclusive,
        ] {
            assert!(
                !ModeMatrix::compatible(LockMode::Exclusive, mode),
                "EX should block {:?}",
                mode
            );
        }
    }

    #[test]
    fn shared_readers_coexist() {
        assert!(ModeMatrix::compatible(
            LockMode::ProtectedRead,
            LockMode::ProtectedRead
        ));
    }

    #[test]
    fn protected_write_admits_concurrent_read() {
        // The distinction between PW and EX: PW still lets CR through
        assert!(ModeMatrix::compatible(
            LockMode::ProtectedWrite,
            LockMode::ConcurrentRead
        ));
        assert!(ModeMatrix::compatible(
            LockMode::ConcurrentRead,
            LockMode::ProtectedWrite
        ));
    }

    #[test]
    fn protected_write_blocks_protected_read() {
        assert!(!ModeMatrix::compatible(
            LockMode::ProtectedWrite,
            LockMode::ProtectedRead
        ));
    }

    #[test]
    fn concurrent_write_pairs_with_itself() {
        assert!(ModeMatrix::compatible(
            LockMode::ConcurrentWrite,
            LockMode::ConcurrentWrite
        ));
    }

    #[test]
    fn concurrent_write_blocks_protected_read() {
        assert!(!ModeMatrix::compatible(
            LockMode::ConcurrentWrite,
            LockMode::ProtectedRead
        ));
        assert!(!ModeMatrix::compatible(
            LockMode::ProtectedRead,
            LockMode::ConcurrentWrite
        ));
    }

    #[test]
    fn matrix_is_symmetric() {
        for held in ALL {
            for requested in ALL {
                assert_eq!(
                    ModeMatrix::compatible(held, requested),
                    ModeMatrix::compatible(requested, held),
                    "symmetry broken for {:?}/{:?}",
                    held,
                    requested
                );
            }
        }
    }

    // =========================================================================
    // Aggregate admissibility
    // =========================================================================

    #[test]
    fn admissible_against_nothing() {
        assert!(ModeMatrix::admissible(
            std::iter::empty(),
            LockMode::Exclusive
        ));
    }

    #[test]
    fn admissible_shared_crowd_rejects_writer() {
        let held = [
            LockMode::ProtectedRead,
            LockMode::ProtectedRead,
            LockMode::ConcurrentRead,
        ];
        assert!(ModeMatrix::admissible(held, LockMode::ProtectedRead));
        assert!(!ModeMatrix::admissible(held, LockMode::Exclusive));
    }

    #[test]
    fn one_incompatible_holder_vetoes() {
        // CR alone would admit PR, but the PW holder blocks it
        let held = [LockMode::ConcurrentRead, LockMode::ProtectedWrite];
        assert!(!ModeMatrix::admissible(held, LockMode::ProtectedRead));
    }
}
