//! Scripted assistant: the first keyword found in the message picks the reply.

use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::{AppError, AppResult},
    extract::AppJson,
    response::ApiResponse,
    state::AppState,
};

const MAX_MESSAGE_CHARS: usize = 500;

const FALLBACK: &str = "Sorry, I didn't quite get that. You can ask me about hotels, \
     restaurants, rentals, stadiums, transport, visas or the weather in Morocco.";

static REPLIES: &[(&[&str], &str)] = &[
    (
        &["hello", "hi", "salam", "bonjour", "marhba"],
        "Marhba bik! I'm your World Cup 2030 guide to Morocco. How can I help?",
    ),
    (
        &["hotel", "stay", "accommodation", "room"],
        "You can browse hotels by city, price and rating on the Hotels page, \
         and book a room in a few clicks.",
    ),
    (
        &["restaurant", "food", "eat", "tagine", "couscous"],
        "Moroccan cuisine is a treat! Check the Restaurants page for tagine, \
         couscous and more, filtered by city.",
    ),
    (
        &["rental", "apartment", "villa", "riad"],
        "Looking for a riad or an apartment? The Rentals page lists options \
         with bedrooms and guest capacity.",
    ),
    (
        &["car", "drive"],
        "Car rentals can be booked from the Bookings page; pick-up is available \
         in every host city.",
    ),
    (
        &["stadium", "match", "ticket", "world cup", "football"],
        "Matches will be played in Casablanca, Rabat, Marrakech, Fes, Tangier \
         and Agadir. Tickets are sold through the official FIFA platform.",
    ),
    (
        &["train", "transport", "bus", "taxi", "airport"],
        "The Al Boraq high-speed train links Tangier, Rabat and Casablanca; \
         ONCF trains, buses and petit taxis cover the rest.",
    ),
    (
        &["visa", "passport"],
        "Many nationalities can enter Morocco visa-free for up to 90 days. \
         Check with your nearest Moroccan consulate before travelling.",
    ),
    (
        &["weather", "temperature", "climate"],
        "Expect warm, sunny days in summer, cooler evenings on the coast and \
         hot afternoons inland.",
    ),
    (
        &["currency", "money", "dirham", "exchange"],
        "The local currency is the Moroccan dirham (MAD). Cards are widely \
         accepted in cities; carry cash for markets.",
    ),
    (
        &["thank", "shukran", "merci"],
        "You're welcome! Enjoy your stay in Morocco.",
    ),
];

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/chatbot", post(chat))
}

/// Whole-word match for single words, substring match for phrases.
fn mentions(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword || word.strip_suffix('s') == Some(keyword))
}

pub fn reply_to(message: &str) -> &'static str {
    let text = message.to_lowercase();
    REPLIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| mentions(&text, k)))
        .map(|(_, reply)| *reply)
        .unwrap_or(FALLBACK)
}

#[instrument(skip(payload))]
pub async fn chat(
    AppJson(payload): AppJson<ChatRequest>,
) -> AppResult<Json<ApiResponse<ChatReply>>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message is required".into()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::BadRequest(format!(
            "Message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    let reply = reply_to(message);
    debug!(fallback = reply == FALLBACK, "chatbot replied");
    Ok(Json(ApiResponse::ok(ChatReply { reply })))
}
