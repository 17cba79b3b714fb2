pub mod answer;
pub mod category;
pub mod question;
pub mod test_result;
pub mod user;
