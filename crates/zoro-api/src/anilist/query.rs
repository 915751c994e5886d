//! Every GraphQL document sent to AniList, in one place.
//!
//! The media selection set grows with the layout hint: compact blocks only
//! need titles and progress caps, cards add scores and genres, full adds
//! release dates and native titles. Documents are assembled by string template
//! because the field set is layout-driven and small.

use zoro_core::block::Layout;

const COMPACT_MEDIA_FIELDS: &str = "\
id
idMal
title { romaji english }
coverImage { medium }
episodes
chapters
format";

const CARD_MEDIA_FIELDS: &str = "\
id
idMal
title { romaji english }
coverImage { large medium }
episodes
chapters
format
averageScore
genres";

const FULL_MEDIA_FIELDS: &str = "\
id
idMal
title { romaji english native }
coverImage { large medium }
episodes
chapters
format
averageScore
genres
startDate { year month day }
endDate { year month day }";

/// Selection set for the layout hint. Tables render the same fields cards do.
pub fn media_fields(layout: Option<Layout>) -> &'static str {
    match layout {
        Some(Layout::Compact) => COMPACT_MEDIA_FIELDS,
        Some(Layout::Full) => FULL_MEDIA_FIELDS,
        Some(Layout::Card) | Some(Layout::Table) | None => CARD_MEDIA_FIELDS,
    }
}

const ENTRY_FIELDS: &str = "\
id
status
progress
score(format: POINT_100)
repeat
startedAt { year month day }
completedAt { year month day }";

pub fn list_query(layout: Option<Layout>) -> String {
    format!(
        "query ($userName: String, $status: MediaListStatus, $type: MediaType) {{
    MediaListCollection(userName: $userName, status: $status, type: $type) {{
        lists {{
            entries {{
                {ENTRY_FIELDS}
                media {{ {fields} }}
            }}
        }}
    }}
}}",
        fields = media_fields(layout)
    )
}

pub fn single_query(layout: Option<Layout>) -> String {
    format!(
        "query ($userName: String, $mediaId: Int, $type: MediaType) {{
    MediaList(userName: $userName, mediaId: $mediaId, type: $type) {{
        {ENTRY_FIELDS}
        media {{ {fields} }}
    }}
}}",
        fields = media_fields(layout)
    )
}

pub fn media_query(layout: Option<Layout>) -> String {
    format!(
        "query ($mediaId: Int, $type: MediaType) {{
    Media(id: $mediaId, type: $type) {{ {fields} }}
}}",
        fields = media_fields(layout)
    )
}

pub fn search_query(layout: Option<Layout>) -> String {
    format!(
        "query ($search: String, $type: MediaType, $page: Int, $perPage: Int) {{
    Page(page: $page, perPage: $perPage) {{
        media(search: $search, type: $type) {{ {fields} }}
    }}
}}",
        fields = media_fields(layout)
    )
}

pub const STATS_QUERY: &str = "\
query ($name: String) {
    User(name: $name) {
        name
        statistics {
            anime {
                count
                episodesWatched
                minutesWatched
                meanScore
                statuses { status count }
            }
            manga {
                count
                chaptersRead
                meanScore
                statuses { status count }
            }
        }
    }
}";

pub const VIEWER_QUERY: &str = "\
query {
    Viewer {
        id
        name
    }
}";

pub const SAVE_ENTRY_MUTATION: &str = "\
mutation ($mediaId: Int, $status: MediaListStatus, $progress: Int, $scoreRaw: Int) {
    SaveMediaListEntry(mediaId: $mediaId, status: $status, progress: $progress, scoreRaw: $scoreRaw) {
        id
        status
        progress
        score(format: POINT_100)
        repeat
        startedAt { year month day }
        completedAt { year month day }
        media { id idMal title { romaji english } coverImage { medium } episodes chapters format }
    }
}";

pub const FIND_ENTRY_QUERY: &str = "\
query ($mediaId: Int, $type: MediaType) {
    MediaList(mediaId: $mediaId, type: $type) {
        id
    }
}";

pub const DELETE_ENTRY_MUTATION: &str = "\
mutation ($id: Int) {
    DeleteMediaListEntry(id: $id) {
        deleted
    }
}";
