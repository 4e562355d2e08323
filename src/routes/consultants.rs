use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{authorize, AuthenticatedUser, Authority};
use crate::error::{AppError, AppResult};
use crate::models::{Consultant, Language};
use crate::schema::{consultant_agency, consultants, languages};
use crate::state::AppState;

const SEARCH_PATH: &str = "/users/consultants/search";
const ADMIN_CONSULTANTS_PATH: &str = "/useradmin/consultants";
const MATCH_ALL: &str = "*";
const DEFAULT_PER_PAGE: i64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub field: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    FirstName,
    LastName,
    Email,
}

impl SortField {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "FIRSTNAME" => Some(SortField::FirstName),
            "LASTNAME" => Some(SortField::LastName),
            "EMAIL" => Some(SortField::Email),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SortField::FirstName => "FIRSTNAME",
            SortField::LastName => "LASTNAME",
            SortField::Email => "EMAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub page: i64,
    pub per_page: i64,
    pub field: SortField,
    pub ascending: bool,
}

impl SearchQuery {
    pub fn validate(&self) -> AppResult<SearchParams> {
        let raw = self
            .query
            .as_deref()
            .ok_or_else(|| AppError::bad_request("query is required"))?;
        let query = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| AppError::bad_request("query is not valid utf-8"))?
            .trim()
            .to_string();
        if query.is_empty() {
            return Err(AppError::bad_request("query must not be blank"));
        }

        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page < 1 || per_page < 1 {
            return Err(AppError::bad_request("page and perPage must be positive"));
        }

        let field = match self.field.as_deref() {
            None => SortField::FirstName,
            Some(raw) => SortField::parse(raw)
                .ok_or_else(|| AppError::bad_request("field must be FIRSTNAME, LASTNAME or EMAIL"))?,
        };
        let ascending = match self.order.as_deref().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => true,
            Some("DESC") => false,
            Some(_) => return Err(AppError::bad_request("order must be ASC or DESC")),
        };

        Ok(SearchParams {
            query,
            page,
            per_page,
            field,
            ascending,
        })
    }
}

impl SearchParams {
    fn href(&self, page: i64) -> String {
        format!(
            "{SEARCH_PATH}?query={}&page={page}&perPage={}&field={}&order={}",
            utf8_percent_encode(&self.query, NON_ALPHANUMERIC),
            self.per_page,
            self.field.as_str(),
            if self.ascending { "ASC" } else { "DESC" },
        )
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// Case-insensitive infix pattern with LIKE wildcards escaped.
pub fn infix_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub href: String,
    pub method: &'static str,
}

impl Link {
    fn new(href: String, method: &'static str) -> Self {
        Self { href, method }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Link>,
}

pub fn search_links(params: &SearchParams, total: i64) -> SearchLinks {
    let has_next = params.page.saturating_mul(params.per_page) < total;
    SearchLinks {
        self_link: Link::new(params.href(params.page), "GET"),
        next: has_next.then(|| Link::new(params.href(params.page + 1), "GET")),
        previous: (params.page > 1).then(|| Link::new(params.href(params.page - 1), "GET")),
    }
}

#[derive(Debug, Serialize)]
pub struct AgencyRef {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultantDto {
    pub id: Uuid,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub status: String,
    pub absent: bool,
    pub absence_message: Option<String>,
    pub team_consultant: bool,
    pub formal_language: bool,
    pub languages: Vec<String>,
    pub agencies: Vec<AgencyRef>,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct ConsultantLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
    pub update: Link,
    pub delete: Link,
    pub agencies: Link,
}

impl ConsultantLinks {
    fn for_consultant(id: Uuid) -> Self {
        let base = format!("{ADMIN_CONSULTANTS_PATH}/{id}");
        Self {
            self_link: Link::new(base.clone(), "GET"),
            update: Link::new(base.clone(), "PUT"),
            delete: Link::new(base.clone(), "DELETE"),
            agencies: Link::new(format!("{base}/agencies"), "GET"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConsultantResource {
    #[serde(rename = "_embedded")]
    pub embedded: ConsultantDto,
    #[serde(rename = "_links")]
    pub links: ConsultantLinks,
}

#[derive(Debug, Serialize)]
pub struct ConsultantSearchResult {
    pub total: i64,
    #[serde(rename = "_embedded")]
    pub embedded: Vec<ConsultantResource>,
    #[serde(rename = "_links")]
    pub links: SearchLinks,
}

pub async fn search_consultants(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> AppResult<Json<ConsultantSearchResult>> {
    authorize(&user, &[Authority::UserAdmin])?;
    let Query(query) = query?;
    let params = query.validate()?;

    let pattern = (params.query != MATCH_ALL).then(|| infix_pattern(&params.query));
    let matching = || {
        let mut statement = consultants::table
            .filter(consultants::delete_date.is_null())
            .into_boxed();
        if let Some(pattern) = pattern.as_ref() {
            statement = statement.filter(
                consultants::first_name
                    .ilike(pattern.clone())
                    .or(consultants::last_name.ilike(pattern.clone()))
                    .or(consultants::email.ilike(pattern.clone()))
                    .or(consultants::username.ilike(pattern.clone())),
            );
        }
        statement
    };

    let mut conn = state.db()?;
    let total: i64 = matching().count().get_result(&mut conn)?;

    let mut page = matching();
    page = match (params.field, params.ascending) {
        (SortField::FirstName, true) => page.order(consultants::first_name.asc()),
        (SortField::FirstName, false) => page.order(consultants::first_name.desc()),
        (SortField::LastName, true) => page.order(consultants::last_name.asc()),
        (SortField::LastName, false) => page.order(consultants::last_name.desc()),
        (SortField::Email, true) => page.order(consultants::email.asc()),
        (SortField::Email, false) => page.order(consultants::email.desc()),
    };
    let found: Vec<Consultant> = page
        .then_order_by(consultants::id.asc())
        .offset(params.offset())
        .limit(params.per_page)
        .load(&mut conn)?;

    let ids: Vec<Uuid> = found.iter().map(|consultant| consultant.id).collect();
    let mut agencies: HashMap<Uuid, Vec<AgencyRef>> = HashMap::new();
    for (consultant_id, agency_id) in consultant_agency::table
        .filter(consultant_agency::consultant_id.eq_any(ids.clone()))
        .filter(consultant_agency::delete_date.is_null())
        .order(consultant_agency::agency_id.asc())
        .select((consultant_agency::consultant_id, consultant_agency::agency_id))
        .load::<(Uuid, i64)>(&mut conn)?
    {
        agencies
            .entry(consultant_id)
            .or_default()
            .push(AgencyRef { id: agency_id });
    }
    let mut spoken: HashMap<Uuid, Vec<String>> = HashMap::new();
    for language in languages::table
        .filter(languages::consultant_id.eq_any(ids))
        .order(languages::language_code.asc())
        .load::<Language>(&mut conn)?
    {
        spoken
            .entry(language.consultant_id)
            .or_default()
            .push(language.language_code);
    }

    let embedded = found
        .into_iter()
        .map(|consultant| ConsultantResource {
            links: ConsultantLinks::for_consultant(consultant.id),
            embedded: ConsultantDto {
                agencies: agencies.remove(&consultant.id).unwrap_or_default(),
                languages: spoken.remove(&consultant.id).unwrap_or_default(),
                id: consultant.id,
                username: consultant.username,
                firstname: consultant.first_name,
                lastname: consultant.last_name,
                email: consultant.email,
                status: consultant.status,
                absent: consultant.is_absent,
                absence_message: consultant.absence_message,
                team_consultant: consultant.is_team_consultant,
                formal_language: consultant.language_formal,
                create_date: consultant.create_date,
                update_date: consultant.update_date,
            },
        })
        .collect();

    Ok(Json(ConsultantSearchResult {
        total,
        embedded,
        links: search_links(&params, total),
    }))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LanguagesPayload {
    pub languages: Vec<String>,
}

pub fn normalize_languages(codes: &[String]) -> AppResult<BTreeSet<String>> {
    codes
        .iter()
        .map(|code| {
            if code.len() == 2 && code.bytes().all(|byte| byte.is_ascii_lowercase()) {
                Ok(code.clone())
            } else {
                Err(AppError::bad_request(format!("invalid language code {code:?}")))
            }
        })
        .collect()
}

pub async fn update_languages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<LanguagesPayload>, JsonRejection>,
) -> AppResult<Json<LanguagesPayload>> {
    authorize(&user, &[Authority::ConsultantDefault])?;
    let Json(payload) = payload?;
    let codes = normalize_languages(&payload.languages)?;

    let mut conn = state.db()?;
    let exists = consultants::table
        .find(user.user_id)
        .filter(consultants::delete_date.is_null())
        .select(consultants::id)
        .first::<Uuid>(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(AppError::not_found());
    }

    let rows: Vec<Language> = codes
        .iter()
        .map(|code| Language {
            consultant_id: user.user_id,
            language_code: code.clone(),
        })
        .collect();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(languages::table.filter(languages::consultant_id.eq(user.user_id)))
            .execute(conn)?;
        if !rows.is_empty() {
            diesel::insert_into(languages::table)
                .values(&rows)
                .execute(conn)?;
        }
        Ok(())
    })?;

    info!(consultant_id = %user.user_id, count = rows.len(), "replaced consultant languages");
    Ok(Json(LanguagesPayload {
        languages: codes.into_iter().collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(query: &str) -> SearchQuery {
        SearchQuery {
            query: Some(query.to_string()),
            page: None,
            per_page: None,
            field: None,
            order: None,
        }
    }

    #[test]
    fn defaults_paging_and_sorting() {
        let params = search(" Anna ").validate().unwrap();
        assert_eq!(params.query, "Anna");
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, DEFAULT_PER_PAGE);
        assert_eq!(params.field, SortField::FirstName);
        assert!(params.ascending);
    }

    #[test]
    fn decodes_encoded_query_once_more() {
        let params = search("M%C3%BCller").validate().unwrap();
        assert_eq!(params.query, "Müller");
    }

    #[test]
    fn rejects_invalid_search_parameters() {
        assert!(SearchQuery {
            query: None,
            ..search("x")
        }
        .validate()
        .is_err());
        assert!(search("  ").validate().is_err());
        assert!(SearchQuery {
            page: Some(0),
            ..search("x")
        }
        .validate()
        .is_err());
        assert!(SearchQuery {
            field: Some("AGE".into()),
            ..search("x")
        }
        .validate()
        .is_err());
        assert!(SearchQuery {
            order: Some("sideways".into()),
            ..search("x")
        }
        .validate()
        .is_err());
    }

    #[test]
    fn sort_options_are_case_insensitive() {
        let params = SearchQuery {
            field: Some("lastname".into()),
            order: Some("desc".into()),
            ..search("x")
        }
        .validate()
        .unwrap();
        assert_eq!(params.field, SortField::LastName);
        assert!(!params.ascending);
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(infix_pattern("an_na%"), "%an\\_na\\%%");
    }

    #[test]
    fn links_only_point_to_existing_pages() {
        let params = SearchQuery {
            page: Some(2),
            per_page: Some(5),
            ..search("a b")
        }
        .validate()
        .unwrap();
        let links = search_links(&params, 11);
        assert_eq!(
            links.self_link.href,
            "/users/consultants/search?query=a%20b&page=2&perPage=5&field=FIRSTNAME&order=ASC"
        );
        assert!(links.next.unwrap().href.contains("page=3"));
        assert!(links.previous.unwrap().href.contains("page=1"));

        let last = search_links(&params, 10);
        assert!(last.next.is_none());
    }

    #[test]
    fn language_codes_are_validated_and_deduplicated() {
        let codes = normalize_languages(&["de".into(), "en".into(), "de".into()]).unwrap();
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["de", "en"]);
        assert!(normalize_languages(&["DE".into()]).is_err());
        assert!(normalize_languages(&["deu".into()]).is_err());
        assert!(normalize_languages(&[]).unwrap().is_empty());
    }
}
