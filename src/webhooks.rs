use rocket::{catchers, http::Status, routes, Build, Request, Rocket};

pub mod github;
pub use github::{github_webhook, WebhookSecret};

use crate::pipeline::Pipeline;

const GREETING: &str = "specwatch is running";

#[rocket::get("/")]
pub fn index() -> &'static str {
    GREETING
}

/// Renders guard failures as plain text, like every other reply.
#[rocket::catch(default)]
pub fn plain_text_catcher(status: Status, _request: &Request) -> (Status, String) {
    (status, status.to_string())
}

pub fn build_rocket(pipeline: Pipeline, secret: Option<String>) -> Rocket<Build> {
    rocket::build()
        .mount("/", routes![index, github_webhook])
        .register("/", catchers![plain_text_catcher])
        .manage(pipeline)
        .manage(WebhookSecret(secret))
}
