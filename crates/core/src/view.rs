//! Pure derivation of the visible task page from cached state.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::{FilterCategory, SortOption, Task};

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// User-selected inputs of the view. Changing any of them resets the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewCriteria {
    pub filter: FilterCategory,
    pub sort: SortOption,
    pub project_ids: BTreeSet<String>,
    pub label_ids: BTreeSet<String>,
}

/// Whether the catalogs backing the secondary filters have been loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Catalog {
    pub has_projects: bool,
    pub has_labels: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub current_page: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
}

pub fn derive_page(
    tasks: &[Task],
    criteria: &ViewCriteria,
    catalog: Catalog,
    today: NaiveDate,
    page: usize,
    page_size: usize,
) -> TaskPage {
    let mut filtered = filter_tasks(tasks, criteria, catalog, today);
    sort_tasks(&mut filtered, criteria.sort);
    paginate(&filtered, page, page_size)
}

pub fn filter_tasks(
    tasks: &[Task],
    criteria: &ViewCriteria,
    catalog: Catalog,
    today: NaiveDate,
) -> Vec<Task> {
    let filter_projects = criteria.filter.applies_project_filter()
        && catalog.has_projects
        && !criteria.project_ids.is_empty();
    let filter_labels = criteria.filter.applies_label_filter()
        && catalog.has_labels
        && !criteria.label_ids.is_empty();

    tasks
        .iter()
        .filter(|task| matches_category(task, criteria.filter, today))
        .filter(|task| {
            !filter_projects
                || task
                    .project_id
                    .as_ref()
                    .is_some_and(|project| criteria.project_ids.contains(project))
        })
        .filter(|task| {
            !filter_labels
                || task
                    .labels
                    .iter()
                    .any(|label| criteria.label_ids.contains(label))
        })
        .cloned()
        .collect()
}

fn matches_category(task: &Task, category: FilterCategory, today: NaiveDate) -> bool {
    match category {
        FilterCategory::All => !task.is_completed(),
        FilterCategory::Inbox => task.project_id.is_none() && !task.is_completed(),
        FilterCategory::Today => {
            !task.is_completed() && task.due_day().is_some_and(|due| due <= today)
        }
        FilterCategory::Upcoming => {
            !task.is_completed() && task.due_day().is_some_and(|due| due > today)
        }
        FilterCategory::Completed => task.is_completed(),
    }
}

/// Stable ascending sort; tasks missing the sort key go last.
pub fn sort_tasks(tasks: &mut [Task], sort: SortOption) {
    match sort {
        SortOption::Default => {}
        SortOption::DueDate => tasks.sort_by(|a, b| missing_last(a.due_day(), b.due_day())),
        SortOption::Priority => tasks.sort_by(|a, b| missing_last(a.priority, b.priority)),
    }
}

fn missing_last<T: Ord>(lhs: Option<T>, rhs: Option<T>) -> Ordering {
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => lhs.cmp(&rhs),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn total_pages(filtered_count: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    filtered_count.div_ceil(page_size).max(1)
}

pub fn paginate(tasks: &[Task], page: usize, page_size: usize) -> TaskPage {
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size);
    let slice = if start >= tasks.len() {
        Vec::new()
    } else {
        let end = (start + page_size).min(tasks.len());
        tasks[start..end].to_vec()
    };

    TaskPage {
        tasks: slice,
        current_page: page,
        total_pages: total_pages(tasks.len(), page_size),
        filtered_count: tasks.len(),
    }
}
