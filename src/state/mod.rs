pub mod milestone_tracker;
pub mod schedule_store;
pub mod widget_store;

pub use milestone_tracker::MilestoneTracker;
pub use schedule_store::ScheduleStore;
pub use widget_store::WidgetStore;
