//! Public movie catalog endpoints.
//!
//! All of these sit behind the admission middleware: by the time a handler
//! runs, the request has been authenticated, counted against quota, and
//! logged. The handlers themselves are plain parameterized reads.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::movie::{
    CastMember, Movie, MovieDetail, MovieListQuery, Pagination, SearchQuery,
};
use crate::state::AppState;

/// Hard cap on page size for the public listing.
const MAX_PAGE_SIZE: i64 = 50;

/// API index.
///
/// # Endpoint
///
/// `GET /` (public, not gated), mirrors what the docs advertise.
pub async fn api_index(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let movie_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(json!({
        "message": "Movie Database API",
        "version": env!("CARGO_PKG_VERSION"),
        "movie_count": movie_count,
        "endpoints": {
            "movies": "/api/movies",
            "search": "/api/search",
            "stats": "/api/stats",
            "genres": "/api/genres",
            "years": "/api/years"
        }
    })))
}

/// List movies with pagination and filters.
///
/// # Endpoint
///
/// `GET /api/movies?page=1&limit=20&genre=Drama&year=1999&search=space`
///
/// # Response
///
/// ```json
/// {
///   "movies": [ { "id": 1, "title": "...", "genres": [...], "cast": [...] } ],
///   "pagination": { "page": 1, "limit": 20, "total": 132, "pages": 7,
///                   "has_next": true, "has_prev": false }
/// }
/// ```
pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<MovieListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);

    let (movies, total) = load_movie_page(
        &state,
        query.genre.as_deref(),
        query.year,
        query.search.as_deref(),
        page,
        limit,
    )
    .await?;

    let pages = (total + limit - 1) / limit;
    Ok(Json(json!({
        "movies": movies,
        "pagination": Pagination {
            page,
            limit,
            total,
            pages,
            has_next: page * limit < total,
            has_prev: page > 1,
        }
    })))
}

/// Get a single movie by id, with genres and cast folded in.
///
/// # Endpoint
///
/// `GET /api/movies/{id}`
pub async fn get_movie(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> Result<Json<MovieDetail>, AppError> {
    let movie = sqlx::query_as::<_, Movie>(
        "SELECT id, title, year, runtime, rating, director, plot, poster_url
         FROM movies WHERE id = $1",
    )
    .bind(movie_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::MovieNotFound)?;

    let detail = attach_relations(&state, movie).await?;
    Ok(Json(detail))
}

/// Search movies.
///
/// # Endpoint
///
/// `GET /api/search?q=alien&year=1979&genre=Horror`
///
/// At least one of `q`/`title`, `year`, `genre` is required; returns the
/// first 50 matches.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let term = query.q.or(query.title);
    if term.is_none() && query.year.is_none() && query.genre.is_none() {
        return Err(AppError::InvalidRequest(
            "At least one search parameter required".to_string(),
        ));
    }

    let (movies, total) = load_movie_page(
        &state,
        query.genre.as_deref(),
        query.year,
        term.as_deref(),
        1,
        MAX_PAGE_SIZE,
    )
    .await?;

    Ok(Json(json!({
        "movies": movies,
        "total": total
    })))
}

/// Catalog-wide statistics.
///
/// # Endpoint
///
/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let movies_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
        .fetch_one(&state.pool)
        .await?;
    let genres_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie_genres")
        .fetch_one(&state.pool)
        .await?;
    let cast_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movie_cast")
        .fetch_one(&state.pool)
        .await?;
    let (min_year, max_year) = sqlx::query_as::<_, (Option<i32>, Option<i32>)>(
        "SELECT MIN(year), MAX(year) FROM movies",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(json!({
        "movies_total": movies_total,
        "genres_total": genres_total,
        "cast_total": cast_total,
        "year_range": { "min": min_year, "max": max_year }
    })))
}

/// Distinct genres, alphabetical.
///
/// # Endpoint
///
/// `GET /api/genres`
pub async fn genres(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let genres: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT genre FROM movie_genres ORDER BY genre")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(json!({ "genres": genres })))
}

/// Distinct release years, newest first.
///
/// # Endpoint
///
/// `GET /api/years`
pub async fn years(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let years: Vec<i32> =
        sqlx::query_scalar("SELECT DISTINCT year FROM movies ORDER BY year DESC")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(json!({ "years": years })))
}

/// Fetch one page of movies matching the optional filters, plus the total
/// match count. Shared by the listing and search endpoints.
async fn load_movie_page(
    state: &AppState,
    genre: Option<&str>,
    year: Option<i32>,
    search: Option<&str>,
    page: i64,
    limit: i64,
) -> Result<(Vec<MovieDetail>, i64), AppError> {
    let pattern = search.map(|s| format!("%{s}%"));
    let offset = (page - 1) * limit;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM movies m
        WHERE ($1::text IS NULL OR m.id IN (SELECT movie_id FROM movie_genres WHERE genre = $1))
          AND ($2::int IS NULL OR m.year = $2)
          AND ($3::text IS NULL OR m.title ILIKE $3 OR m.director ILIKE $3 OR m.plot ILIKE $3)
        "#,
    )
    .bind(genre)
    .bind(year)
    .bind(pattern.as_deref())
    .fetch_one(&state.pool)
    .await?;

    let movies = sqlx::query_as::<_, Movie>(
        r#"
        SELECT m.id, m.title, m.year, m.runtime, m.rating, m.director, m.plot, m.poster_url
        FROM movies m
        WHERE ($1::text IS NULL OR m.id IN (SELECT movie_id FROM movie_genres WHERE genre = $1))
          AND ($2::int IS NULL OR m.year = $2)
          AND ($3::text IS NULL OR m.title ILIKE $3 OR m.director ILIKE $3 OR m.plot ILIKE $3)
        ORDER BY m.year DESC, m.title ASC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(genre)
    .bind(year)
    .bind(pattern.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let mut details = Vec::with_capacity(movies.len());
    for movie in movies {
        details.push(attach_relations(state, movie).await?);
    }

    Ok((details, total))
}

/// Load a movie's genres and cast from their side tables.
async fn attach_relations(state: &AppState, movie: Movie) -> Result<MovieDetail, AppError> {
    let genres: Vec<String> =
        sqlx::query_scalar("SELECT genre FROM movie_genres WHERE movie_id = $1 ORDER BY genre")
            .bind(movie.id)
            .fetch_all(&state.pool)
            .await?;

    let cast = sqlx::query_as::<_, CastMember>(
        "SELECT actor_name, role FROM movie_cast WHERE movie_id = $1",
    )
    .bind(movie.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(MovieDetail {
        movie,
        genres,
        cast,
    })
}
