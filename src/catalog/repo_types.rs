use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{AppError, FieldError};

/// Upper bound on any listing response.
pub const MAX_RESULTS: i64 = 50;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub address: Option<String>,
    pub price_per_night: f64,
    pub rating: f64,
    pub stars: Option<i16>,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub featured: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub address: Option<String>,
    pub cuisine: Option<String>,
    pub average_price: f64,
    pub rating: f64,
    pub images: Vec<String>,
    pub featured: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub address: Option<String>,
    pub rental_type: String,
    pub price_per_night: f64,
    pub bedrooms: Option<i16>,
    pub max_guests: Option<i16>,
    pub rating: f64,
    pub images: Vec<String>,
    pub featured: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// What the filter needs to know about any listing.
pub trait Listing {
    fn city(&self) -> &str;
    fn price(&self) -> f64;
    fn rating(&self) -> f64;
    fn featured(&self) -> bool;
}

impl Listing for Hotel {
    fn city(&self) -> &str {
        &self.city
    }
    fn price(&self) -> f64 {
        self.price_per_night
    }
    fn rating(&self) -> f64 {
        self.rating
    }
    fn featured(&self) -> bool {
        self.featured
    }
}

impl Listing for Restaurant {
    fn city(&self) -> &str {
        &self.city
    }
    fn price(&self) -> f64 {
        self.average_price
    }
    fn rating(&self) -> f64 {
        self.rating
    }
    fn featured(&self) -> bool {
        self.featured
    }
}

impl Listing for Rental {
    fn city(&self) -> &str {
        &self.city
    }
    fn price(&self) -> f64 {
        self.price_per_night
    }
    fn rating(&self) -> f64 {
        self.rating
    }
    fn featured(&self) -> bool {
        self.featured
    }
}

/// Query string of the listing endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    pub city: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Rating floor.
    pub rating: Option<f64>,
    pub featured: Option<bool>,
}

impl ListingFilter {
    /// Trims the city and rejects impossible bounds.
    pub fn normalized(mut self) -> Result<Self, AppError> {
        self.city = self
            .city
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut errors = Vec::new();
        for (field, value) in [("minPrice", self.min_price), ("maxPrice", self.max_price)] {
            if matches!(value, Some(v) if !v.is_finite() || v < 0.0) {
                errors.push(FieldError::new(field, "Price must be a non-negative number"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                errors.push(FieldError::new("minPrice", "minPrice cannot exceed maxPrice"));
            }
        }
        if matches!(self.rating, Some(r) if !(0.0..=5.0).contains(&r)) {
            errors.push(FieldError::new("rating", "Rating must be between 0 and 5"));
        }
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }

    pub fn matches<L: Listing>(&self, item: &L) -> bool {
        if let Some(city) = &self.city {
            // Unicode case folding, like Postgres lower().
            if item.city().to_lowercase() != city.to_lowercase() {
                return false;
            }
        }
        if matches!(self.min_price, Some(min) if item.price() < min) {
            return false;
        }
        if matches!(self.max_price, Some(max) if item.price() > max) {
            return false;
        }
        if matches!(self.rating, Some(floor) if item.rating() < floor) {
            return false;
        }
        if matches!(self.featured, Some(f) if item.featured() != f) {
            return false;
        }
        true
    }

    /// Featured first, then best rated, capped at `MAX_RESULTS`.
    pub fn apply<L: Listing + Clone>(&self, items: &[L]) -> Vec<L> {
        let mut out: Vec<L> = items.iter().filter(|i| self.matches(*i)).cloned().collect();
        out.sort_by(|a, b| {
            b.featured()
                .cmp(&a.featured())
                .then(b.rating().total_cmp(&a.rating()))
        });
        out.truncate(MAX_RESULTS as usize);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hotel(city: &str, price: f64, rating: f64, featured: bool) -> Hotel {
        Hotel {
            id: Uuid::new_v4(),
            name: format!("{city} {price}"),
            description: None,
            city: city.into(),
            address: None,
            price_per_night: price,
            rating,
            stars: None,
            amenities: vec![],
            images: vec![],
            featured,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn filters_and_orders() {
        let hotels = vec![
            hotel("Marrakech", 150.0, 4.2, false),
            hotel("marrakech", 300.0, 4.8, false),
            hotel("MARRAKECH", 250.0, 4.0, true),
            hotel("Marrakech", 99.0, 5.0, true),
            hotel("Marrakech", 301.0, 5.0, true),
            hotel("Marrakech", 200.0, 3.9, true),
            hotel("Fes", 200.0, 4.9, true),
        ];
        let filter = ListingFilter {
            city: Some("Marrakech".into()),
            min_price: Some(100.0),
            max_price: Some(300.0),
            rating: Some(4.0),
            featured: None,
        };
        let out = filter.apply(&hotels);
        let prices: Vec<f64> = out.iter().map(|h| h.price_per_night).collect();
        assert_eq!(prices, vec![250.0, 300.0, 150.0]);
    }

    #[test]
    fn results_are_capped() {
        let hotels: Vec<Hotel> = (0..80).map(|i| hotel("Rabat", i as f64, 4.0, false)).collect();
        assert_eq!(ListingFilter::default().apply(&hotels).len(), MAX_RESULTS as usize);
    }

    #[test]
    fn bad_bounds_collect_every_error() {
        let err = ListingFilter {
            min_price: Some(500.0),
            max_price: Some(100.0),
            rating: Some(7.0),
            ..Default::default()
        }
        .normalized()
        .unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn city_match_folds_non_ascii_case() {
        let filter = ListingFilter {
            city: Some("FÈS".into()),
            ..Default::default()
        };
        assert!(filter.matches(&hotel("Fès", 500.0, 4.0, false)));
        assert!(!filter.matches(&hotel("Fes", 500.0, 4.0, false)));
    }

    #[test]
    fn blank_city_is_ignored() {
        let f = ListingFilter {
            city: Some("   ".into()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert!(f.city.is_none());
    }
}
