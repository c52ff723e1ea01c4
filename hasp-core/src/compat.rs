use crate::types::LockMode;

/// Pure mode-compatibility arithmetic backed by a precomputed matrix.
pub struct ModeMatrix;

impl ModeMatrix {
    /// Central 6x6 compatibility matrix for the DLM lock modes.
    /// Rows: held mode
    /// Cols: requested mode
    /// True = compatible (both can be held at once)
    ///
    /// Order: Null(0), ConcurrentRead(1), ConcurrentWrite(2),
    /// ProtectedRead(3), ProtectedWrite(4), Exclusive(5)
    #[rustfmt::skip]
    const MATRIX: [[bool; 6]; 6] = [
        //         NL     CR     CW     PR     PW     EX
        /* NL */ [true,  true,  true,  true,  true,  true ],
        /* CR */ [true,  true,  true,  true,  true,  false],
        /* CW */ [true,  true,  true,  false, false, false],
        /* PR */ [true,  true,  false, true,  false, false],
        /* PW */ [true,  true,  false, false, false, false],
        /* EX */ [true,  false, false, false, false, false],
    ];

    /// O(1) check whether a requested mode can coexist with a held mode
    pub fn compatible(held: LockMode, requesting: LockMode) -> bool {
        Self::MATRIX[held.to_index()][requesting.to_index()]
    }

    /// A request is admissible against a set of holders when it is
    /// compatible with every one of them.
    pub fn admissible<I>(held: I, requesting: LockMode) -> bool
    where
        I: IntoIterator<Item = LockMode>,
    {
        held.into_iter()
            .all(|h| Self::compatible(h, requesting))
    }
}
