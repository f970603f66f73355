//! Movie catalog models.
//!
//! The catalog is served read-only through the gated public endpoints;
//! genres and cast live in side tables and are folded into the response.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maps to the `movies` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub rating: f64,
    pub director: String,
    pub plot: String,
    pub poster_url: String,
}

/// Cast member of a movie, from the `movie_cast` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CastMember {
    #[serde(rename = "name")]
    pub actor_name: String,
    pub role: Option<String>,
}

/// A movie with its genres and cast folded in.
#[derive(Debug, Serialize)]
pub struct MovieDetail {
    #[serde(flatten)]
    pub movie: Movie,
    pub genres: Vec<String>,
    pub cast: Vec<CastMember>,
}

/// Query parameters accepted by `GET /api/movies`.
#[derive(Debug, Deserialize)]
pub struct MovieListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub search: Option<String>,
}

/// Query parameters accepted by `GET /api/search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

/// Pagination envelope returned with movie lists.
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}
