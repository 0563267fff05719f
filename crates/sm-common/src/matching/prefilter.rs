use crate::model::{Employee, Project};

/// An employee can take the project when they hold no current assignment and
/// their availability window covers the whole project window.
pub fn is_available(employee: &Employee, project: &Project) -> bool {
    if employee.current_project.is_some() {
        return false;
    }

    let window = &employee.availability;
    window.start <= project.start_date && window.end.map_or(true, |end| end >= project.end_date)
}

/// Employees eligible for `project`, in input order. Pure; runs before scoring.
pub fn eligible_employees<'a>(project: &Project, employees: &'a [Employee]) -> Vec<&'a Employee> {
    employees
        .iter()
        .filter(|employee| is_available(employee, project))
        .collect()
}
