//! English strings for the series table. Unknown keys come back as `[[key]]`.

const STRINGS: &[(&str, &str)] = &[
    ("seriesname", "Series name"),
    ("form_seriesid", "Series ID"),
    ("default", "Default"),
    ("noconnectedseries", "No series are connected to this course."),
    ("createseriesforcourse", "Create new series"),
    ("delete_series", "Delete series"),
    (
        "delete_confirm_series",
        "Do you really want to remove this series from the course?",
    ),
    ("editseries", "Edit series"),
    ("delete", "Delete"),
    ("loading", "Loading..."),
    ("importseries", "Import series"),
    ("importfailed", "The series could not be imported."),
    ("seriesnotfound", "Series not found"),
];

pub fn get_string(key: &str) -> String {
    STRINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| format!("[[{key}]]"))
}
