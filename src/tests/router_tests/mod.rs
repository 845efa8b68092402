mod api_tests;
mod files_tests;
