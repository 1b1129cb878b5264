mod speed;

pub use speed::TimeControls;
