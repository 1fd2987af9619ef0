use rocket::Route;

pub mod auth;
pub mod ballot;
pub mod branding;
pub mod committee;
pub mod member;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(ballot::routes());
    routes.extend(branding::routes());
    routes.extend(committee::routes());
    routes.extend(member::routes());
    routes.extend(voting::routes());
    routes
}
