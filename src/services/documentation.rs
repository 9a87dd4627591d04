use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Artist Buzz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::tracklists::put_tracklist,
        crate::routes::tracklists::list_tracklists,
        crate::routes::host::build_round,
        crate::routes::host::get_round,
        crate::routes::host::start_question,
        crate::routes::host::reveal,
        crate::routes::host::next_question,
        crate::routes::host::reset,
        crate::routes::host::transfer_device,
        crate::routes::host::room_snapshot,
        crate::routes::player::join,
        crate::routes::player::heartbeat,
        crate::routes::player::leave,
        crate::routes::player::buzz,
        crate::routes::player::answer,
        crate::routes::sse::room_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::tracklist::TrackDto,
            crate::dto::tracklist::PutTrackListRequest,
            crate::dto::tracklist::TrackListSummary,
            crate::dto::player::JoinRoomRequest,
            crate::dto::player::PlayerSummary,
            crate::dto::room::BuildRoundRequest,
            crate::dto::room::TransferDeviceRequest,
            crate::dto::room::BuzzRequest,
            crate::dto::room::AnswerRequest,
            crate::dto::room::BuzzResponse,
            crate::dto::room::BuzzSummary,
            crate::dto::room::LastResultSummary,
            crate::dto::room::QuestionSummary,
            crate::dto::room::RoundSummary,
            crate::dto::room::RoomStateSummary,
            crate::dto::room::RoomSnapshot,
            crate::dto::sse::BannerEvent,
            crate::dto::sse::DocumentChangedEvent,
            crate::state::state_machine::RoomPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tracklists", description = "Candidate track lists rounds are built from"),
        (name = "host", description = "Round and question flow driven by the host"),
        (name = "players", description = "Presence, buzzes and answers"),
        (name = "rooms", description = "Room snapshots"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
