/// Raw `application/x-www-form-urlencoded` fields, as sent by multi-valued
/// inputs (checkbox groups, collections) that a flat struct cannot hold.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// First value of `name`, or an empty string
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .unwrap_or_default()
    }

    /// Trimmed value, `None` when blank
    pub fn optional(&self, name: &str) -> Option<String> {
        let value = self.get(name).trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Every non-blank value sent as `name` or `name[]`, in submission order
    pub fn all(&self, name: &str) -> Vec<String> {
        let array_name = format!("{}[]", name);
        self.fields
            .iter()
            .filter(|(key, _)| key == name || *key == array_name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Checkbox semantics: present with any value but "0"
    pub fn checked(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|(key, value)| key == name && value != "0")
    }
}

/// An option of a select, radio group or checkbox group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Options with every value of `selected` marked
pub fn choices(options: &[(&'static str, &'static str)], selected: &[String]) -> Vec<Choice> {
    options
        .iter()
        .map(|&(value, label)| Choice {
            value,
            label,
            selected: selected.iter().any(|s| s == value),
        })
        .collect()
}

pub fn single_choice(options: &[(&'static str, &'static str)], selected: &str) -> Vec<Choice> {
    choices(options, &[selected.to_string()])
}
