pub enum WorkerMessage {
    /// The job was cancelled by a caller.
    Cancel,
    /// The job stalled and is being reclaimed by the garbage collector.
    Reap,
}
