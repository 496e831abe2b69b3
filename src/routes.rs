use crate::{
    api::{attendance, leave_request, overtime},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("rate limit settings must be non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));
    let checkin_limiter = Arc::new(build_limiter(config.rate_checkin_per_min));

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/check-in
                    .service(
                        web::resource("/check-in")
                            .wrap(checkin_limiter.clone())
                            .route(web::post().to(attendance::check_in)),
                    )
                    // /attendance/check-out
                    .service(
                        web::resource("/check-out")
                            .wrap(checkin_limiter)
                            .route(web::put().to(attendance::check_out)),
                    )
                    // /attendance/nearest
                    .service(
                        web::resource("/nearest").route(web::get().to(attendance::nearest_point)),
                    )
                    // /attendance/today
                    .service(web::resource("/today").route(web::get().to(attendance::today))),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("").route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/awaiting, before /{id} so it is not taken as an id
                    .service(
                        web::resource("/awaiting")
                            .route(web::get().to(leave_request::awaiting_leave)),
                    )
                    // /leave/{id}
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    // /leave/{id}/approve
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    // /leave/{id}/reject
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    )
                    // /leave/{id}/cancel
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::put().to(leave_request::cancel_leave)),
                    ),
            )
            .service(
                web::scope("/overtime")
                    // /overtime
                    .service(web::resource("").route(web::post().to(overtime::create_overtime)))
                    // /overtime/awaiting
                    .service(
                        web::resource("/awaiting")
                            .route(web::get().to(overtime::awaiting_overtime)),
                    )
                    // /overtime/{id}
                    .service(web::resource("/{id}").route(web::get().to(overtime::get_overtime)))
                    // /overtime/{id}/approve
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(overtime::approve_overtime)),
                    )
                    // /overtime/{id}/reject
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(overtime::reject_overtime)),
                    )
                    // /overtime/{id}/cancel
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::put().to(overtime::cancel_overtime)),
                    ),
            ),
    );
}
