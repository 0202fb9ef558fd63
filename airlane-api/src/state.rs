use airlane_geo::RouteResolver;
use airlane_order::OrderAllocator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub allocator: Arc<OrderAllocator>,
    pub routes: Arc<RouteResolver>,
}
