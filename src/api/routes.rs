use warp::Filter;

use super::{handlers, viewer, AppState};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Every HTTP and websocket route the server exposes
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PATCH", "OPTIONS"])
        .allow_headers(vec!["content-type"]);

    health(state.clone())
        .or(list_sessions(state.clone()))
        .or(create_session(state.clone()))
        .or(get_session(state.clone()))
        .or(update_session(state.clone()))
        .or(start_session(state.clone()))
        .or(join_session(state.clone()))
        .or(set_participant_status(state.clone()))
        .or(ping(state.clone()))
        .or(scan(state.clone()))
        .or(viewer_websocket(state))
        .recover(handlers::handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

pub fn viewer_websocket(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state))
        .map(|ws: warp::ws::Ws, state: AppState| {
            let config = state.viewer.clone();
            ws.max_message_size(config.max_message_bytes)
                .max_frame_size(config.max_message_bytes)
                .on_upgrade(move |websocket| {
                    viewer::handle_viewer_socket(websocket, state.hub, config)
                })
        })
}

fn health(state: AppState) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("health")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::health)
}

fn list_sessions(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::list_sessions)
}

fn create_session(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::create_session)
}

fn get_session(state: AppState) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_session)
}

fn update_session(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String)
        .and(warp::patch())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::update_session)
}

fn start_session(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "start")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::start_session)
}

fn join_session(state: AppState) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "join")
        .and(warp::post())
        .and(warp::addr::remote())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::join_session)
}

fn set_participant_status(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "status")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handlers::set_participant_status)
}

fn ping(state: AppState) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "participants" / String / "ping")
        .and(warp::post())
        .and(with_state(state))
        .and_then(handlers::ping)
}

fn scan(state: AppState) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("scan")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::scan)
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
