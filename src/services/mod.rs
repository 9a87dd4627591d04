/// First-writer-wins buzz arbitration.
pub mod buzz_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Audio playback collaborator.
pub mod playback;
/// Player presence.
pub mod player_service;
/// Room lifecycle, answer evaluation and timers.
pub mod room_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Room store connection supervisor.
pub mod storage_supervisor;
/// Candidate track list management.
pub mod tracklist_service;
