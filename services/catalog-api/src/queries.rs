//! IGDB query construction
//!
//! The upstream API takes a small text query language: `fields`, `where`,
//! `sort`, `limit`, `offset` clauses terminated by semicolons. These
//! builders produce the fixed query shapes the catalog routes use; the
//! gateway sends them verbatim as the request body.

/// Fields returned for game list rows (search results and top lists).
const GAME_LIST_FIELDS: &str = "name, cover.url, total_rating, total_rating_count";

/// Fields returned for the game detail view.
const GAME_DETAIL_FIELDS: &str = "name, cover.url, first_release_date, genres.name, \
     involved_companies.company.name, involved_companies.developer, platforms.name, \
     storyline, summary, total_rating, total_rating_count, game_type.type";

/// Phase one of the trending route: the ten most visited games
/// (popularity source 5) by popularity value.
pub fn trending_popularity() -> String {
    String::from(
        "fields game_id, value, popularity_type;\n\
         where popularity_type = 5;\n\
         sort value desc;\n\
         limit 10;",
    )
}

/// Phase two of the trending route: list rows for the given game ids.
pub fn games_by_ids(ids: &[u64]) -> String {
    let joined = ids
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("fields {GAME_LIST_FIELDS};\nwhere id = ({joined});")
}

/// Top ten rated games of all time, with enough ratings to be meaningful.
pub fn top_rated() -> String {
    format!(
        "fields {GAME_LIST_FIELDS};\n\
         where total_rating_count > 500;\n\
         sort total_rating desc;\n\
         limit 10;"
    )
}

/// Top ten rated games released after the given unix timestamp.
pub fn top_new(threshold_unix: u64) -> String {
    format!(
        "fields {GAME_LIST_FIELDS};\n\
         where first_release_date >= {threshold_unix} & total_rating_count > 50;\n\
         sort total_rating desc;\n\
         limit 10;"
    )
}

/// Release threshold for "new": six 30-day months back from the most recent
/// midnight.
pub fn new_release_threshold(now_unix: u64) -> u64 {
    let midnight = now_unix - (now_unix % 86_400);
    midnight.saturating_sub(6 * 30 * 24 * 60 * 60)
}

/// Name search, paged by offset.
///
/// Short terms (1-2 chars) only match titles starting with the term; longer
/// terms match the term anywhere in the title.
pub fn search_by_name(term: &str, offset: u32) -> String {
    let term = sanitize_term(term);
    let name_filter = if term.chars().count() < 3 {
        format!("name ~ \"{term}\"*")
    } else {
        format!("name ~ *\"{term}\"*")
    };
    format!(
        "fields {GAME_LIST_FIELDS};\n\
         where {name_filter};\n\
         sort total_rating_count desc;\n\
         limit 10;\n\
         offset {offset};"
    )
}

/// Embedded quotes would terminate the query's string literal.
fn sanitize_term(term: &str) -> String {
    term.replace('"', "")
}

/// Full detail record for a single game.
pub fn game_by_id(game_id: u64) -> String {
    format!("fields {GAME_DETAIL_FIELDS};\nwhere id = {game_id};")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_popularity_filters_source_and_limits() {
        let q = trending_popularity();
        assert!(q.contains("where popularity_type = 5;"));
        assert!(q.contains("sort value desc;"));
        assert!(q.contains("limit 10;"));
    }

    #[test]
    fn games_by_ids_joins_with_commas() {
        let q = games_by_ids(&[7, 12, 1905]);
        assert!(q.contains("where id = (7,12,1905);"), "got: {q}");
    }

    #[test]
    fn top_rated_requires_many_ratings() {
        let q = top_rated();
        assert!(q.contains("where total_rating_count > 500;"));
        assert!(q.contains("sort total_rating desc;"));
    }

    #[test]
    fn top_new_embeds_threshold() {
        let q = top_new(1700000000);
        assert!(
            q.contains("where first_release_date >= 1700000000 & total_rating_count > 50;"),
            "got: {q}"
        );
    }

    #[test]
    fn new_release_threshold_aligns_to_midnight() {
        // 2023-11-15T00:00:00Z is 1700006400; six 30-day months is 15552000s.
        let midday = 1700006400 + 12 * 3600;
        assert_eq!(new_release_threshold(midday), 1700006400 - 15_552_000);
    }

    #[test]
    fn short_search_terms_match_prefix_only() {
        let q = search_by_name("ze", 0);
        assert!(q.contains("where name ~ \"ze\"*;"), "got: {q}");
        assert!(q.contains("offset 0;"));
    }

    #[test]
    fn long_search_terms_match_substring() {
        let q = search_by_name("zelda", 20);
        assert!(q.contains("where name ~ *\"zelda\"*;"), "got: {q}");
        assert!(q.contains("offset 20;"));
    }

    #[test]
    fn search_strips_embedded_quotes() {
        let q = search_by_name("zel\"da", 0);
        assert!(!q.contains("zel\"da"), "quote must not survive: {q}");
        assert!(q.contains("*\"zelda\"*"), "got: {q}");
    }

    #[test]
    fn quote_only_term_falls_back_to_prefix_form() {
        // Sanitizing can shorten the term below the substring threshold.
        let q = search_by_name("\"a\"", 0);
        assert!(q.contains("where name ~ \"a\"*;"), "got: {q}");
    }

    #[test]
    fn game_by_id_selects_detail_fields() {
        let q = game_by_id(42);
        assert!(q.contains("where id = 42;"));
        assert!(q.contains("involved_companies.developer"));
        assert!(q.contains("storyline"));
    }
}
