//! Credential validation: password policy, confirmation and uniqueness
//! checks, plus the input formats accounts are built from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::repo::UserStore;
use crate::error::AuthError;

/// Column widths of `users.first_name` / `users.last_name` and `users.email`.
pub const MAX_NAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

pub(crate) fn exceeds(value: &str, max: usize) -> bool {
    value.chars().count() > max
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    !exceeds(email, MAX_EMAIL_LENGTH) && EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]{1,150}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account attributes a password must not resemble.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordContext<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// A single strength rule. Returns a message when the password fails it.
pub trait PasswordRule: Send + Sync {
    fn check(&self, password: &str, ctx: &PasswordContext<'_>) -> Option<String>;
}

pub struct MinimumLength(pub usize);

impl PasswordRule for MinimumLength {
    fn check(&self, password: &str, _ctx: &PasswordContext<'_>) -> Option<String> {
        (password.chars().count() < self.0).then(|| {
            format!(
                "This password is too short. It must contain at least {} characters.",
                self.0
            )
        })
    }
}

pub struct NotEntirelyNumeric;

impl PasswordRule for NotEntirelyNumeric {
    fn check(&self, password: &str, _ctx: &PasswordContext<'_>) -> Option<String> {
        (!password.is_empty() && password.chars().all(|c| c.is_ascii_digit()))
            .then(|| "This password is entirely numeric.".to_string())
    }
}

lazy_static! {
    static ref COMMON_PASSWORDS: HashSet<&'static str> = include_str!("common_passwords.txt")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
}

pub struct NotCommon;

impl PasswordRule for NotCommon {
    fn check(&self, password: &str, _ctx: &PasswordContext<'_>) -> Option<String> {
        let lowered = password.trim().to_lowercase();
        COMMON_PASSWORDS
            .contains(lowered.as_str())
            .then(|| "This password is too common.".to_string())
    }
}

/// Rejects passwords too close to the account's own attributes.
pub struct NotSimilarToAttributes {
    pub max_similarity: f64,
}

impl Default for NotSimilarToAttributes {
    fn default() -> Self {
        Self { max_similarity: 0.7 }
    }
}

/// Upper bound on the matching-blocks ratio: `2 * shared / (len a + len b)`
/// where `shared` counts characters common to both, with multiplicity.
fn similarity(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 0.0;
    }
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_default() += 1;
    }
    let shared = a
        .chars()
        .filter(|c| match available.get_mut(c) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        })
        .count();
    2.0 * shared as f64 / total as f64
}

/// A short attribute can't make a much longer password similar to it.
fn exceeds_length_ratio(password: &str, max_similarity: f64, value: &str) -> bool {
    let pwd_len = password.chars().count();
    let value_len = value.chars().count();
    pwd_len >= 10 * value_len && (value_len as f64) < max_similarity / 2.0 * pwd_len as f64
}

impl PasswordRule for NotSimilarToAttributes {
    fn check(&self, password: &str, ctx: &PasswordContext<'_>) -> Option<String> {
        lazy_static! {
            static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
        }
        let password = password.to_lowercase();
        let attributes = [
            ("username", ctx.username),
            ("email address", ctx.email),
            ("first name", ctx.first_name),
            ("last name", ctx.last_name),
        ];
        for (name, value) in attributes {
            let value = value.to_lowercase();
            if value.is_empty() {
                continue;
            }
            let too_close = NON_WORD
                .split(&value)
                .chain(std::iter::once(value.as_str()))
                .filter(|part| !part.is_empty())
                .filter(|part| !exceeds_length_ratio(&password, self.max_similarity, part))
                .any(|part| similarity(&password, part) >= self.max_similarity);
            if too_close {
                return Some(format!("The password is too similar to the {name}."));
            }
        }
        None
    }
}

/// Ordered set of [`PasswordRule`]s; every failing rule is reported.
#[derive(Clone)]
pub struct PasswordPolicy {
    rules: Vec<Arc<dyn PasswordRule>>,
}

impl PasswordPolicy {
    /// The default rules with the given minimum length.
    pub fn new(min_length: usize) -> Self {
        Self::empty()
            .with_rule(NotSimilarToAttributes::default())
            .with_rule(MinimumLength(min_length))
            .with_rule(NotCommon)
            .with_rule(NotEntirelyNumeric)
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl PasswordRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn validate(&self, password: &str, ctx: &PasswordContext<'_>) -> Result<(), AuthError> {
        let problems: Vec<String> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(password, ctx))
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AuthError::WeakPassword(problems))
        }
    }
}

pub fn ensure_confirmed(password: &str, confirmation: &str) -> Result<(), AuthError> {
    if password != confirmation {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}

pub async fn ensure_email_available(users: &dyn UserStore, email: &str) -> Result<(), AuthError> {
    if users.email_exists(email).await? {
        return Err(AuthError::DuplicateEmail);
    }
    Ok(())
}

pub async fn ensure_username_available(
    users: &dyn UserStore,
    username: &str,
) -> Result<(), AuthError> {
    if users.username_exists(username).await? {
        return Err(AuthError::DuplicateUsername);
    }
    Ok(())
}
