use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{Hotel, Listing, ListingFilter, Rental, Restaurant, MAX_RESULTS};

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn hotels(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Hotel>>;
    async fn hotel(&self, id: Uuid) -> anyhow::Result<Option<Hotel>>;
    async fn restaurants(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Restaurant>>;
    async fn restaurant(&self, id: Uuid) -> anyhow::Result<Option<Restaurant>>;
    async fn rentals(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Rental>>;
    async fn rental(&self, id: Uuid) -> anyhow::Result<Option<Rental>>;
}

const HOTEL_COLUMNS: &str = "id, name, description, city, address, price_per_night, rating, \
                             stars, amenities, images, featured, created_at";
const RESTAURANT_COLUMNS: &str = "id, name, description, city, address, cuisine, average_price, \
                                  rating, images, featured, created_at";
const RENTAL_COLUMNS: &str = "id, name, description, city, address, rental_type, \
                              price_per_night, bedrooms, max_guests, rating, images, featured, \
                              created_at";

/// Table layout of one listing kind. Only compile-time strings reach the SQL.
struct Table {
    name: &'static str,
    columns: &'static str,
    price_column: &'static str,
}

const HOTELS: Table = Table {
    name: "hotels",
    columns: HOTEL_COLUMNS,
    price_column: "price_per_night",
};
const RESTAURANTS: Table = Table {
    name: "restaurants",
    columns: RESTAURANT_COLUMNS,
    price_column: "average_price",
};
const RENTALS: Table = Table {
    name: "rentals",
    columns: RENTAL_COLUMNS,
    price_column: "price_per_night",
};

#[derive(Clone)]
pub struct PgCatalogRepo {
    db: PgPool,
}

impl PgCatalogRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn list<T>(&self, table: &Table, f: &ListingFilter) -> anyhow::Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM {} WHERE TRUE", table.columns, table.name));
        if let Some(city) = &f.city {
            qb.push(" AND lower(city) = lower(").push_bind(city.clone()).push(")");
        }
        if let Some(min) = f.min_price {
            qb.push(format!(" AND {} >= ", table.price_column)).push_bind(min);
        }
        if let Some(max) = f.max_price {
            qb.push(format!(" AND {} <= ", table.price_column)).push_bind(max);
        }
        if let Some(floor) = f.rating {
            qb.push(" AND rating >= ").push_bind(floor);
        }
        if let Some(featured) = f.featured {
            qb.push(" AND featured = ").push_bind(featured);
        }
        qb.push(" ORDER BY featured DESC, rating DESC LIMIT ")
            .push_bind(MAX_RESULTS);

        let rows = qb
            .build_query_as::<T>()
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("list {}", table.name))?;
        Ok(rows)
    }

    async fn get<T>(&self, table: &Table, id: Uuid) -> anyhow::Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", table.columns, table.name);
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("get {} {}", table.name, id))?;
        Ok(row)
    }
}

#[async_trait]
impl CatalogRepo for PgCatalogRepo {
    async fn hotels(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Hotel>> {
        self.list(&HOTELS, filter).await
    }
    async fn hotel(&self, id: Uuid) -> anyhow::Result<Option<Hotel>> {
        self.get(&HOTELS, id).await
    }
    async fn restaurants(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Restaurant>> {
        self.list(&RESTAURANTS, filter).await
    }
    async fn restaurant(&self, id: Uuid) -> anyhow::Result<Option<Restaurant>> {
        self.get(&RESTAURANTS, id).await
    }
    async fn rentals(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Rental>> {
        self.list(&RENTALS, filter).await
    }
    async fn rental(&self, id: Uuid) -> anyhow::Result<Option<Rental>> {
        self.get(&RENTALS, id).await
    }
}

/// In-memory catalogue for `AppState::fake()` and tests.
#[derive(Default)]
pub struct MemoryCatalogRepo {
    pub hotels: RwLock<Vec<Hotel>>,
    pub restaurants: RwLock<Vec<Restaurant>>,
    pub rentals: RwLock<Vec<Rental>>,
}

fn by_id<L: Listing + Clone>(items: &[L], id: Uuid, id_of: impl Fn(&L) -> Uuid) -> Option<L> {
    items.iter().find(|i| id_of(i) == id).cloned()
}

#[async_trait]
impl CatalogRepo for MemoryCatalogRepo {
    async fn hotels(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Hotel>> {
        Ok(filter.apply(&self.hotels.read().await))
    }
    async fn hotel(&self, id: Uuid) -> anyhow::Result<Option<Hotel>> {
        Ok(by_id(&self.hotels.read().await, id, |h| h.id))
    }
    async fn restaurants(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Restaurant>> {
        Ok(filter.apply(&self.restaurants.read().await))
    }
    async fn restaurant(&self, id: Uuid) -> anyhow::Result<Option<Restaurant>> {
        Ok(by_id(&self.restaurants.read().await, id, |r| r.id))
    }
    async fn rentals(&self, filter: &ListingFilter) -> anyhow::Result<Vec<Rental>> {
        Ok(filter.apply(&self.rentals.read().await))
    }
    async fn rental(&self, id: Uuid) -> anyhow::Result<Option<Rental>> {
        Ok(by_id(&self.rentals.read().await, id, |r| r.id))
    }
}
