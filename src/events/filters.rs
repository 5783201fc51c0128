use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    categories::ALL_CATEGORIES,
    repo_types::{EventListing, Visibility},
};

/// Who is asking. Token verification happens before this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(Uuid),
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Anonymous => None,
            Actor::User(id) => Some(*id),
        }
    }
}

impl From<Option<Uuid>> for Actor {
    fn from(id: Option<Uuid>) -> Self {
        id.map_or(Actor::Anonymous, Actor::User)
    }
}

/// Which events an actor may see: public ones, private ones whose invite
/// code was supplied, and everything the actor hosts. Expired events are
/// never visible.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityScope {
    pub actor: Actor,
    pub invite_code: Option<String>,
}

impl VisibilityScope {
    pub fn new(actor: Actor, invite_code: Option<String>) -> Self {
        let invite_code = invite_code.filter(|c| !c.is_empty());
        Self { actor, invite_code }
    }

    pub fn is_host(&self, event: &EventListing) -> bool {
        self.actor.user_id() == Some(event.host_id)
    }

    pub fn admits(&self, event: &EventListing, now: OffsetDateTime) -> bool {
        if event.date_time <= now {
            return false;
        }
        match event.visibility {
            Visibility::Public => true,
            Visibility::Private => {
                self.is_host(event)
                    || matches!(
                        (&self.invite_code, &event.invite_code),
                        (Some(given), Some(stored)) if given == stored
                    )
            }
        }
    }

    pub fn push_sql(&self, qb: &mut QueryBuilder<'static, Postgres>, now: OffsetDateTime) {
        qb.push("e.date_time > ")
            .push_bind(now)
            .push(" AND (e.visibility = 'public'");
        if let Some(code) = &self.invite_code {
            qb.push(" OR (e.visibility = 'private' AND e.invite_code = ")
                .push_bind(code.clone())
                .push(")");
        }
        if let Actor::User(id) = self.actor {
            qb.push(" OR e.host_id = ").push_bind(id);
        }
        qb.push(")");
    }
}

/// Optional discovery criteria. `None` means "not filtered on".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Substring of title or description.
    pub text: Option<String>,
    /// Exact category; the `"all"` sentinel is ignored.
    pub category: Option<String>,
    /// Substring of the venue category snapshot.
    pub venue_category: Option<String>,
    pub starts_at_or_after: Option<OffsetDateTime>,
    pub starts_at_or_before: Option<OffsetDateTime>,
    pub capacity_min: Option<f64>,
    pub capacity_max: Option<f64>,
}

/// One conjunct of the discovery predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    TextContains(String),
    CategoryIs(String),
    VenueCategoryContains(String),
    StartsAtOrAfter(OffsetDateTime),
    StartsAtOrBefore(OffsetDateTime),
    /// Events with unlimited (null) capacity never satisfy a capacity bound.
    CapacityAtLeast(f64),
    CapacityAtMost(f64),
}

impl EventFilter {
    pub fn clauses(&self) -> Vec<Clause> {
        let mut out = Vec::new();
        if let Some(text) = non_empty(&self.text) {
            out.push(Clause::TextContains(text));
        }
        if let Some(cat) = non_empty(&self.category).filter(|c| c != ALL_CATEGORIES) {
            out.push(Clause::CategoryIs(cat));
        }
        if let Some(venue) = non_empty(&self.venue_category) {
            out.push(Clause::VenueCategoryContains(venue));
        }
        if let Some(from) = self.starts_at_or_after {
            out.push(Clause::StartsAtOrAfter(from));
        }
        if let Some(to) = self.starts_at_or_before {
            out.push(Clause::StartsAtOrBefore(to));
        }
        if let Some(min) = self.capacity_min.filter(|v| v.is_finite()) {
            out.push(Clause::CapacityAtLeast(min));
        }
        if let Some(max) = self.capacity_max.filter(|v| v.is_finite()) {
            out.push(Clause::CapacityAtMost(max));
        }
        out
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Clause {
    pub fn push_sql(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        match self {
            Clause::TextContains(text) => {
                qb.push("(strpos(e.title, ")
                    .push_bind(text.clone())
                    .push(") > 0 OR strpos(e.description, ")
                    .push_bind(text.clone())
                    .push(") > 0)");
            }
            Clause::CategoryIs(cat) => {
                qb.push("e.event_category = ").push_bind(cat.clone());
            }
            Clause::VenueCategoryContains(venue) => {
                qb.push("strpos(e.venue_category, ")
                    .push_bind(venue.clone())
                    .push(") > 0");
            }
            Clause::StartsAtOrAfter(from) => {
                qb.push("e.date_time >= ").push_bind(*from);
            }
            Clause::StartsAtOrBefore(to) => {
                qb.push("e.date_time <= ").push_bind(*to);
            }
            Clause::CapacityAtLeast(min) => {
                qb.push("(e.capacity IS NOT NULL AND e.capacity >= ")
                    .push_bind(*min)
                    .push(")");
            }
            Clause::CapacityAtMost(max) => {
                qb.push("(e.capacity IS NOT NULL AND e.capacity <= ")
                    .push_bind(*max)
                    .push(")");
            }
        }
    }

    /// In-process evaluation with the same semantics as the SQL form.
    #[cfg(test)]
    pub fn matches(&self, event: &EventListing) -> bool {
        let contains = |haystack: &Option<String>, needle: &str| {
            haystack.as_deref().is_some_and(|h| h.contains(needle))
        };
        match self {
            Clause::TextContains(text) => {
                event.title.contains(text.as_str()) || event.description.contains(text.as_str())
            }
            Clause::CategoryIs(cat) => event.event_category.as_deref() == Some(cat.as_str()),
            Clause::VenueCategoryContains(venue) => contains(&event.venue_category, venue),
            Clause::StartsAtOrAfter(from) => event.date_time >= *from,
            Clause::StartsAtOrBefore(to) => event.date_time <= *to,
            Clause::CapacityAtLeast(min) => event.capacity.is_some_and(|c| f64::from(c) >= *min),
            Clause::CapacityAtMost(max) => event.capacity.is_some_and(|c| f64::from(c) <= *max),
        }
    }
}

/// Everything the candidate fetch needs: visibility and filter, evaluated at `now`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub scope: VisibilityScope,
    pub filter: EventFilter,
    pub now: OffsetDateTime,
}

impl CandidateQuery {
    pub fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        self.scope.push_sql(qb, self.now);
        for clause in self.filter.clauses() {
            qb.push(" AND ");
            clause.push_sql(qb);
        }
    }

    #[cfg(test)]
    pub fn matches(&self, event: &EventListing) -> bool {
        self.scope.admits(event, self.now) && self.filter.clauses().iter().all(|c| c.matches(event))
    }
}
