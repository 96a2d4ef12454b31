//! Row filtering by outcome category and test-name pattern.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::report::{DataRow, Report};

/// Quiet period after the last keystroke before the text filter is applied.
pub const TEXT_FILTER_DEBOUNCE: Duration = Duration::from_millis(250);

/// Which runs of a row decide whether it matches a category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Only the most recent run.
    #[default]
    Last,
    /// Any run in the row.
    Any,
}

impl FilterStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last => "LAST",
            Self::Any => "ANY",
        }
    }
}

impl FromStr for FilterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LAST" => Ok(Self::Last),
            "ANY" => Ok(Self::Any),
            other => Err(format!("unknown filter strategy {other:?}")),
        }
    }
}

/// A test outcome class, identified by its legend color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub color: String,
    pub is_visible: bool,
}

impl Category {
    pub fn new(color: &str) -> Self {
        Self {
            color: color.to_string(),
            is_visible: true,
        }
    }

    pub fn applies_to(&self, cell_color: &str) -> bool {
        self.color.eq_ignore_ascii_case(cell_color)
    }
}

/// Filter-relevant view of one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRow {
    pub test_name: String,
    pub last_cell_color: String,
    pub all_cell_colors: Vec<String>,
}

impl From<&DataRow> for TestRow {
    fn from(row: &DataRow) -> Self {
        let last = row.cells.last().unwrap_or(&row.header);
        Self {
            test_name: row.test_name(),
            last_cell_color: last.color.clone(),
            all_cell_colors: row.cells.iter().map(|c| c.color.clone()).collect(),
        }
    }
}

/// Compiled name filter. An invalid pattern falls back to a literal
/// substring match so that filtering always proceeds.
#[derive(Debug, Clone)]
enum NameMatcher {
    Regex(Regex),
    Literal(String),
}

#[derive(Debug, Clone)]
struct TextFilter {
    source: String,
    matcher: NameMatcher,
}

impl TextFilter {
    fn compile(source: &str) -> Self {
        let lowered = source.to_lowercase();
        let matcher = match Regex::new(&lowered) {
            Ok(regex) => NameMatcher::Regex(regex),
            Err(e) => {
                tracing::debug!(pattern = source, "invalid text filter: {e}");
                NameMatcher::Literal(lowered)
            }
        };
        Self {
            source: source.to_string(),
            matcher,
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self.matcher, NameMatcher::Regex(_))
    }

    fn matches(&self, test_name: &str) -> bool {
        let name = test_name.to_lowercase();
        match &self.matcher {
            NameMatcher::Regex(regex) => regex.is_match(&name),
            NameMatcher::Literal(literal) => name.contains(literal.as_str()),
        }
    }
}

type UpdateCallback = Box<dyn FnMut(&FilterEngine)>;

/// Decides row visibility from category toggles, strategy and name filter.
/// Every change re-evaluates all rows.
pub struct FilterEngine {
    rows: Vec<TestRow>,
    categories: Vec<Category>,
    last_col_colors: Option<Vec<String>>,
    strategy: FilterStrategy,
    text: TextFilter,
    visible: Vec<bool>,
    num_tests_visible: usize,
    on_update: Vec<UpdateCallback>,
}

impl fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("rows", &self.rows.len())
            .field("categories", &self.categories)
            .field("strategy", &self.strategy)
            .field("text", &self.text.source)
            .field("num_tests_visible", &self.num_tests_visible)
            .finish_non_exhaustive()
    }
}

impl FilterEngine {
    pub fn new(rows: Vec<TestRow>, colors: &[String]) -> Self {
        let visible = vec![true; rows.len()];
        let num_tests_visible = rows.len();
        Self {
            rows,
            categories: colors.iter().map(|c| Category::new(c)).collect(),
            last_col_colors: None,
            strategy: FilterStrategy::default(),
            text: TextFilter::compile(""),
            visible,
            num_tests_visible,
            on_update: Vec::new(),
        }
    }

    pub fn from_report(report: &Report) -> Self {
        let rows = report.data_rows().map(TestRow::from).collect();
        let mut engine = Self::new(rows, &report.colors);
        engine.last_col_colors = report.last_col_colors.clone();
        engine
    }

    pub fn on_update(&mut self, callback: impl FnMut(&FilterEngine) + 'static) {
        self.on_update.push(Box::new(callback));
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn strategy(&self) -> FilterStrategy {
        self.strategy
    }

    pub fn text_pattern(&self) -> &str {
        &self.text.source
    }

    /// False while the text pattern is not a valid regular expression.
    pub fn text_filter_valid(&self) -> bool {
        self.text.is_valid()
    }

    pub fn num_tests_visible(&self) -> usize {
        self.num_tests_visible
    }

    /// Visibility per row, in report order, as of the last [`apply`].
    ///
    /// [`apply`]: FilterEngine::apply
    pub fn visibility(&self) -> &[bool] {
        &self.visible
    }

    pub fn matches_category(&self, category: &Category, row: &TestRow) -> bool {
        match self.strategy {
            FilterStrategy::Last => category.applies_to(&row.last_cell_color),
            FilterStrategy::Any => row.all_cell_colors.iter().any(|c| category.applies_to(c)),
        }
    }

    pub fn is_row_visible(&self, row: &TestRow) -> bool {
        self.categories
            .iter()
            .any(|cat| cat.is_visible && self.matches_category(cat, row))
            && self.text.matches(&row.test_name)
    }

    /// Recompute every row's visibility and fire the update callbacks.
    pub fn apply(&mut self) {
        let visible: Vec<bool> = self.rows.iter().map(|row| self.is_row_visible(row)).collect();
        self.num_tests_visible = visible.iter().filter(|v| **v).count();
        self.visible = visible;
        tracing::debug!(
            strategy = self.strategy.as_str(),
            visible = self.num_tests_visible,
            total = self.rows.len(),
            "filter applied"
        );

        let mut callbacks = std::mem::take(&mut self.on_update);
        for callback in &mut callbacks {
            callback(self);
        }
        callbacks.append(&mut self.on_update);
        self.on_update = callbacks;
    }

    /// Replace the text pattern. Not applied until [`apply`] runs.
    ///
    /// [`apply`]: FilterEngine::apply
    pub fn set_text_filter(&mut self, pattern: &str) {
        self.text = TextFilter::compile(pattern);
    }

    pub fn set_strategy(&mut self, strategy: FilterStrategy) {
        self.strategy = strategy;
        self.apply();
    }

    /// Hide every category except `index`, then apply.
    pub fn show_only(&mut self, index: usize) {
        for (i, cat) in self.categories.iter_mut().enumerate() {
            cat.is_visible = i == index;
        }
        self.apply();
    }

    pub fn toggle(&mut self, index: usize) {
        if let Some(cat) = self.categories.get_mut(index) {
            cat.is_visible = !cat.is_visible;
        }
        self.apply();
    }

    /// Clear the text filter, show all categories, then apply.
    pub fn reset(&mut self) {
        self.text = TextFilter::compile("");
        for cat in &mut self.categories {
            cat.is_visible = true;
        }
        self.apply();
    }

    /// Indices of categories whose toggles make sense under the current
    /// strategy. Under `Last`, only colors the report says can occur in the
    /// last column; reports without that list expose everything.
    pub fn exposed_categories(&self) -> Vec<usize> {
        self.categories
            .iter()
            .enumerate()
            .filter(|(_, cat)| match (self.strategy, &self.last_col_colors) {
                (FilterStrategy::Last, Some(last)) => last.iter().any(|c| cat.applies_to(c)),
                _ => true,
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Debounce for the text filter input: every keystroke restarts the window,
/// and [`poll`](TextFilterDebounce::poll) fires once it has elapsed.
#[derive(Debug, Clone)]
pub struct TextFilterDebounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Default for TextFilterDebounce {
    fn default() -> Self {
        Self::new(TEXT_FILTER_DEBOUNCE)
    }
}

impl TextFilterDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn keystroke(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// True exactly once per burst of keystrokes, when the window has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
