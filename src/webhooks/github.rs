use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use tracing::{debug, trace};

mod signing;
pub use signing::SignedPayload;
#[cfg(test)]
pub(crate) use signing::sign;

use crate::pipeline::{Pipeline, Reply};

const X_GITHUB_EVENT: &str = "X-GitHub-Event";
const X_GITHUB_DELIVERY: &str = "X-GitHub-Delivery";

/// Secret used to check webhook signatures, if any.
pub struct WebhookSecret(pub Option<String>);

#[rocket::post("/webhook", data = "<payload>")]
pub async fn github_webhook(
    event: GitHubEventType<'_>,
    payload: SignedPayload,
    pipeline: &State<Pipeline>,
) -> Reply {
    debug!(
        "received {} event (delivery {})",
        event.name.unwrap_or("untyped"),
        event.delivery.unwrap_or("unknown")
    );
    trace!("payload: {}", payload.0);

    pipeline.handle_event(event.name, &payload.0).await
}

/// Event metadata GitHub sends as headers. Both are optional so the endpoint can also be called
/// by hand with just a payload.
pub struct GitHubEventType<'r> {
    pub name: Option<&'r str>,
    pub delivery: Option<&'r str>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GitHubEventType<'r> {
    type Error = anyhow::Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = request.headers();
        if headers.get(X_GITHUB_EVENT).count() > 1 {
            return Outcome::Error((
                Status::BadRequest,
                anyhow::anyhow!("request header needs at most one event type"),
            ));
        }

        Outcome::Success(GitHubEventType {
            name: headers.get_one(X_GITHUB_EVENT),
            delivery: headers.get_one(X_GITHUB_DELIVERY),
        })
    }
}
