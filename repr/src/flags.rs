use bitflags::bitflags;

bitflags! {
    /// Record-type bits packed into the varint `flag` field of every
    /// trailer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordType: u64 {
        /// Payload-bearing block record.
        const SEGMENT = 1;
        /// Commit trailer terminating a write session.
        const COMMIT = 1 << 1;
        /// Commit trailer that carries a back-link to the previous commit.
        const PREV_COMMIT = (1 << 1) | 1;
    }
}
