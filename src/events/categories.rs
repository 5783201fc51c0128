pub const EVENT_CATEGORIES: [&str; 40] = [
    "Conferences",
    "Trade Shows",
    "Seminars",
    "Workshops",
    "Product Launches",
    "Company Parties",
    "Networking Events",
    "Weddings",
    "Birthday Parties",
    "Anniversaries",
    "Festivals",
    "Concerts",
    "Art Exhibitions",
    "Charity Events",
    "Sports Competitions",
    "Marathons",
    "Educational Events",
    "Religious Gatherings",
    "Political Rallies",
    "Community Fairs",
    "Award Ceremonies",
    "Fashion Shows",
    "Hybrid Events",
    "Virtual Events",
    "Galas",
    "Film Screenings",
    "Book Signings",
    "Car Shows",
    "Food and Wine Tastings",
    "Parades",
    "Comedy Shows",
    "Theater Performances",
    "Meetups",
    "Retreats",
    "Fundraisers",
    "Open Houses",
    "Career Fairs",
    "Town Halls",
    "Science Fairs",
    "Grand Openings",
];

/// Sentinel the filter form sends for "no category".
pub const ALL_CATEGORIES: &str = "all";

/// Returns the canonical spelling of a category, matched case-insensitively.
pub fn normalize_category(value: &str) -> Option<&'static str> {
    let target = value.trim();
    if target.is_empty() {
        return None;
    }
    EVENT_CATEGORIES
        .iter()
        .copied()
        .find(|cat| cat.eq_ignore_ascii_case(target))
}
