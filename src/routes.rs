use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    pub keywords: Vec<String>,
    pub price: f64,
}

/// Reads `ROUTE_<i>_NAME`, `ROUTE_<i>_KEYWORDS` and `ROUTE_<i>_PRICE`
/// for i = 1.. until the first missing name.
pub fn load_routes<F>(lookup: F) -> Result<Vec<Route>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut routes: Vec<Route> = Vec::new();
    let mut route_index = 1;
    while let Some(name) = lookup(&format!("ROUTE_{}_NAME", route_index)) {
        if name.trim().is_empty() {
            break;
        }
        let keywords: Vec<String> = lookup(&format!("ROUTE_{}_KEYWORDS", route_index))
            .unwrap_or_default()
            .split(',')
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        let price = match lookup(&format!("ROUTE_{}_PRICE", route_index)) {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                AppError::Config(format!("ROUTE_{}_PRICE is not a number: {}", route_index, raw))
            })?,
            None => 0.0,
        };

        if !keywords.is_empty() && price > 0.0 {
            let route = Route { name, keywords, price };
            match routes.iter_mut().find(|existing| existing.name == route.name) {
                Some(existing) => *existing = route,
                None => routes.push(route),
            }
        }
        route_index += 1;
    }
    Ok(routes)
}

/// All route keywords, in route order.
pub fn search_keywords(routes: &[Route]) -> Vec<&str> {
    routes
        .iter()
        .flat_map(|route| route.keywords.iter().map(String::as_str))
        .collect()
}

pub fn find_matching_route<'a>(routes: &'a [Route], body: &str) -> Option<&'a Route> {
    routes
        .iter()
        .find(|route| route.keywords.iter().any(|keyword| body.contains(keyword.as_str())))
}
