//! Profile display formatting

use crate::models::{Profile, ProfileId};

/// Format the profile list as a table, marking the current profile with `*`
pub fn format_profile_list(profiles: &[Profile], current: Option<&ProfileId>) -> String {
    if profiles.is_empty() {
        return "No profiles found.".to_string();
    }

    let name_width = profiles
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "   {:<name_width$}  {:<36}  {}\n",
        "Name",
        "Id",
        "Updated",
        name_width = name_width,
    ));
    output.push_str(&format!(
        "   {:-<name_width$}  {:-<36}  {:-<16}\n",
        "",
        "",
        "",
        name_width = name_width,
    ));

    for profile in profiles {
        let marker = if current == Some(&profile.id) { "*" } else { " " };
        output.push_str(&format!(
            "{}  {:<name_width$}  {:<36}  {}\n",
            marker,
            profile.name,
            profile.id,
            profile.updated_at.format("%Y-%m-%d %H:%M"),
            name_width = name_width,
        ));
    }

    output
}

/// Format a single profile's details
pub fn format_profile_details(profile: &Profile, transaction_count: usize) -> String {
    let mut output = String::new();
    output.push_str(&format!("Profile:      {}\n", profile.name));
    output.push_str(&format!("Id:           {}\n", profile.id));
    output.push_str(&format!(
        "Created:      {}\n",
        profile.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!(
        "Updated:      {}\n",
        profile.updated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!("Transactions: {}\n", transaction_count));
    output
}
